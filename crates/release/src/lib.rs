//! Release engine for cascade workspaces.
//!
//! Given a set of change requests against packages of a [`ProjectGraph`],
//! this crate computes a closed release plan: which packages get new
//! versions, which dependents must follow, and in what order to publish.
//!
//! # Architecture
//!
//! - [`change`] - change types, descriptors and the change file store
//! - [`policy`] - lockstep and individual version policies
//! - [`resolve`] - the fixed-point change propagation engine
//! - [`writer`] - applying a resolved plan to package manifests
//! - [`manager`] - policy-driven `ensure` and `bump` over the whole workspace
//! - [`changelog`] - changelog requests handed to a renderer
//! - [`publish`] - publish plans and publish targets
//! - [`range`] - dependency range rewriting that preserves declaration style
//! - [`version`] - npm-compatible version increments
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_release::{ChangeDescriptor, ChangeResolver, ChangeType, PolicyRegistry};
//!
//! let registry = PolicyRegistry::default();
//! let requests = ChangeResolver::new(&graph, &registry)
//!     .resolve(&[ChangeDescriptor::new("lib", ChangeType::Minor)])?;
//! for change in requests.sorted() {
//!     println!("{} -> {}", change.package_name, change.new_version);
//! }
//! ```

pub mod change;
pub mod changelog;
pub mod config;
pub mod error;
pub mod manager;
pub mod policy;
pub mod prerelease;
pub mod publish;
pub mod range;
pub mod resolve;
pub mod version;
pub mod writer;

pub use cascade_workspace::ProjectGraph;
pub use change::{
    ChangeDescriptor, ChangeEntry, ChangeFile, ChangeFileStore, ChangeType, LoadedChangeFile,
    collect_descriptors,
};
pub use changelog::{
    ChangeComment, ChangelogRenderer, ChangelogRequest, changelog_requests, render_all,
};
pub use config::ReleaseConfig;
pub use error::{Error, Result};
pub use manager::{BumpOutcome, VersionManager, VersionUpdate};
pub use policy::{
    BumpType, DependencyPolicy, IndividualPolicy, LockStepPolicy, PolicyRegistry, VersionPolicy,
};
pub use prerelease::PrereleaseToken;
pub use publish::{
    LogTarget, PublishContext, PublishPlan, PublishResult, PublishStep, PublishTarget, tag_name,
};
pub use range::WriteMode;
pub use resolve::{ChangeRequests, ChangeResolver, ResolvedChange, VersionPolicyChange};
pub use writer::{
    DependencyRewrite, PackageWriter, WriteOutcome, change_info_new_version, written_version,
};

/// Whether an operation only reports what it would do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DryRun {
    /// Report only; nothing is written or published.
    Yes,
    /// Apply changes.
    #[default]
    No,
}

impl DryRun {
    /// Whether this is a dry run.
    #[must_use]
    pub const fn is_dry_run(self) -> bool {
        matches!(self, Self::Yes)
    }

    /// Log label for the mode.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Yes => "DRYRUN",
            Self::No => "APPLYING",
        }
    }
}

impl From<bool> for DryRun {
    fn from(dry_run: bool) -> Self {
        if dry_run { Self::Yes } else { Self::No }
    }
}

//! Publish plans and publish targets.
//!
//! A [`PublishPlan`] is the ordered list of packages to publish, derived from
//! a resolution. Executing it drives a [`PublishTarget`] one package at a
//! time: a consumer's publish may rely on its producer already being
//! available, so steps never run concurrently.
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_release::publish::{PublishContext, PublishResult, PublishStep, PublishTarget};
//!
//! struct Registry;
//!
//! impl PublishTarget for Registry {
//!     fn name(&self) -> &'static str { "registry" }
//!
//!     fn publish<'a>(
//!         &'a self,
//!         ctx: &'a PublishContext,
//!         step: &'a PublishStep,
//!     ) -> Pin<Box<dyn Future<Output = Result<PublishResult>> + Send + 'a>> {
//!         Box::pin(async move { Ok(PublishResult::success("registry", "Published")) })
//!     }
//!
//!     fn tag<'a>(
//!         &'a self,
//!         ctx: &'a PublishContext,
//!         step: &'a PublishStep,
//!     ) -> Pin<Box<dyn Future<Output = Result<PublishResult>> + Send + 'a>> {
//!         Box::pin(async move { Ok(PublishResult::success("registry", "Tagged")) })
//!     }
//! }
//! ```

use crate::DryRun;
use crate::change::ChangeType;
use crate::error::{Error, Result};
use crate::prerelease::PrereleaseToken;
use crate::resolve::ChangeRequests;
use crate::version::strip_build;
use crate::writer::written_version;
use cascade_workspace::ProjectGraph;
use semver::Version;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tracing::{info, warn};

/// Separator between package name and version in release tags.
pub const DEFAULT_TAG_SEPARATOR: &str = "_";

/// Dist-tag used when the plan contains a hotfix.
pub const HOTFIX_DIST_TAG: &str = "hotfix";

/// The release tag for `package` at `version`, e.g. `lib_v1.2.0`.
#[must_use]
pub fn tag_name(package: &str, version: &Version, separator: &str) -> String {
    format!("{package}{separator}v{version}")
}

/// One package to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishStep {
    /// The package.
    pub package_name: String,
    /// Version to publish.
    pub version: Version,
    /// Magnitude of the release.
    pub change_type: ChangeType,
    /// Release tag name.
    pub tag: String,
    /// Project folder.
    pub folder: PathBuf,
}

/// Ordered packages to publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishPlan {
    steps: Vec<PublishStep>,
    dist_tag: Option<String>,
}

impl PublishPlan {
    /// Builds the plan for a resolution.
    ///
    /// Keeps packages released with a patch, minor, major or hotfix change
    /// whose project publishes, in resolved order. Step versions and tags
    /// use the version the writer stamps under `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if a prerelease version cannot be computed.
    pub fn from_changes(
        requests: &ChangeRequests,
        graph: &ProjectGraph,
        token: &PrereleaseToken,
        separator: &str,
    ) -> Result<Self> {
        let mut steps = Vec::new();
        for change in requests.sorted() {
            if change.change_type <= ChangeType::Dependency {
                continue;
            }
            let Some(project) = graph.get(&change.package_name) else {
                continue;
            };
            if !project.should_publish() {
                continue;
            }
            let version = written_version(change, token)?;
            steps.push(PublishStep {
                package_name: change.package_name.clone(),
                tag: tag_name(&change.package_name, &version, separator),
                version,
                change_type: change.change_type,
                folder: project.folder().to_path_buf(),
            });
        }

        let dist_tag = steps
            .iter()
            .any(|step| step.change_type == ChangeType::Hotfix)
            .then(|| HOTFIX_DIST_TAG.to_string());

        Ok(Self { steps, dist_tag })
    }

    /// Steps in publish order.
    #[must_use]
    pub fn steps(&self) -> &[PublishStep] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether there is nothing to publish.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The dist-tag packages are published under, if not the default.
    #[must_use]
    pub fn dist_tag(&self) -> Option<&str> {
        self.dist_tag.as_deref()
    }

    /// Drops steps whose version is already published.
    ///
    /// Build metadata is ignored on both sides.
    #[must_use]
    pub fn skip_published(mut self, published: &BTreeMap<String, Vec<Version>>) -> Self {
        self.steps.retain(|step| {
            let version = strip_build(&step.version);
            let exists = published
                .get(&step.package_name)
                .is_some_and(|versions| versions.iter().any(|v| strip_build(v) == version));
            if exists {
                warn!(package = %step.package_name, version = %step.version, "Skip publish: version already exists");
            }
            !exists
        });
        self
    }

    /// Publishes and tags every step in order, stopping at the first
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the target's error, or [`Error::Publish`] when the target
    /// reports a failed result.
    pub async fn execute(
        &self,
        target: &dyn PublishTarget,
        dry_run: DryRun,
    ) -> Result<Vec<PublishResult>> {
        let mut ctx = PublishContext::new().with_dry_run(dry_run);
        if let Some(tag) = &self.dist_tag {
            ctx = ctx.with_dist_tag(tag.clone());
        }

        let mut results = Vec::with_capacity(self.steps.len() * 2);
        for step in &self.steps {
            info!(
                mode = dry_run.label(),
                target = target.name(),
                package = %step.package_name,
                version = %step.version,
                dist_tag = ctx.dist_tag.as_deref().unwrap_or("latest"),
                "Publishing"
            );
            let published = target.publish(&ctx, step).await?;
            results.push(check(published, step)?);
            let tagged = target.tag(&ctx, step).await?;
            results.push(check(tagged, step)?);
        }
        Ok(results)
    }
}

fn check(result: PublishResult, step: &PublishStep) -> Result<PublishResult> {
    if result.success {
        Ok(result)
    } else {
        Err(Error::publish(result.message, Some(step.package_name.clone())))
    }
}

/// Options common to every step of a publish run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishContext {
    /// Dist-tag to publish under; `None` means the registry default.
    pub dist_tag: Option<String>,
    /// Whether this is a dry run.
    pub dry_run: DryRun,
}

impl PublishContext {
    /// Creates a context with the default dist-tag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the dist-tag.
    #[must_use]
    pub fn with_dist_tag(mut self, tag: impl Into<String>) -> Self {
        self.dist_tag = Some(tag.into());
        self
    }

    /// Sets the dry-run flag.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: DryRun) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Outcome of one target operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    /// Name of the target.
    pub target: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable message.
    pub message: String,
}

impl PublishResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            success: true,
            message: message.into(),
        }
    }

    /// Creates a dry-run result.
    #[must_use]
    pub fn dry_run(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            success: true,
            message: format!("[dry-run] {}", message.into()),
        }
    }

    /// Creates a failure result.
    #[must_use]
    pub fn failure(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            success: false,
            message: message.into(),
        }
    }
}

/// Somewhere packages are published to.
///
/// Implementations wrap a package registry, a git remote, or both.
pub trait PublishTarget: Send + Sync {
    /// Name of the target, e.g. "npm".
    fn name(&self) -> &'static str;

    /// Publishes one package.
    fn publish<'a>(
        &'a self,
        ctx: &'a PublishContext,
        step: &'a PublishStep,
    ) -> Pin<Box<dyn Future<Output = Result<PublishResult>> + Send + 'a>>;

    /// Creates the release tag for one package.
    fn tag<'a>(
        &'a self,
        ctx: &'a PublishContext,
        step: &'a PublishStep,
    ) -> Pin<Box<dyn Future<Output = Result<PublishResult>> + Send + 'a>>;
}

/// A target that only logs what it would do.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTarget;

impl PublishTarget for LogTarget {
    fn name(&self) -> &'static str {
        "log"
    }

    fn publish<'a>(
        &'a self,
        ctx: &'a PublishContext,
        step: &'a PublishStep,
    ) -> Pin<Box<dyn Future<Output = Result<PublishResult>> + Send + 'a>> {
        Box::pin(async move {
            let message = format!(
                "publish {}@{} from {}",
                step.package_name,
                step.version,
                step.folder.display()
            );
            info!(mode = ctx.dry_run.label(), %message);
            Ok(PublishResult::dry_run(self.name(), message))
        })
    }

    fn tag<'a>(
        &'a self,
        ctx: &'a PublishContext,
        step: &'a PublishStep,
    ) -> Pin<Box<dyn Future<Output = Result<PublishResult>> + Send + 'a>> {
        Box::pin(async move {
            let message = format!("tag {}", step.tag);
            info!(mode = ctx.dry_run.label(), %message);
            Ok(PublishResult::dry_run(self.name(), message))
        })
    }
}

//! Dependency specifier parsing and npm range matching.
//!
//! npm range syntax is wider than what [`semver::VersionReq`] accepts
//! (space-separated comparators, `||` alternatives, hyphen ranges, `x`
//! wildcards). Ranges are normalized into one `VersionReq` per `||`
//! alternative and a version satisfies the range when any alternative
//! matches.

use semver::{Version, VersionReq};

/// Prefix of the workspace protocol.
pub const WORKSPACE_PREFIX: &str = "workspace:";

/// Prefix of an npm alias (`npm:real-name@range`).
pub const ALIAS_PREFIX: &str = "npm:";

/// The range part of a `workspace:` specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceRange {
    /// `workspace:*`
    Any,
    /// `workspace:~`
    Tilde,
    /// `workspace:^`
    Caret,
    /// `workspace:<range>` with an explicit version or range.
    Explicit(String),
}

impl WorkspaceRange {
    /// Whether this is one of the `*`, `~`, `^` shorthands that are resolved
    /// against the local version at publish time.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Explicit(_))
    }
}

/// A parsed dependency declaration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySpecifier {
    /// An exact version such as `1.2.3`.
    Version(Version),
    /// Any npm range: `^1.2.3`, `~1.2.3`, `>=1.0.0 <2.0.0`, `1.x`, `*`.
    Range(String),
    /// The workspace protocol.
    Workspace(WorkspaceRange),
    /// `npm:<name>@<range>`
    Alias {
        /// The real package name.
        name: String,
        /// The range after the `@`.
        range: String,
    },
    /// A dist-tag such as `latest` or `next`.
    Tag(String),
    /// Anything else: file paths, git URLs, tarballs.
    Other(String),
}

impl DependencySpecifier {
    /// Parses a dependency value.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(rest) = trimmed.strip_prefix(WORKSPACE_PREFIX) {
            return Self::Workspace(match rest {
                "*" => WorkspaceRange::Any,
                "~" => WorkspaceRange::Tilde,
                "^" => WorkspaceRange::Caret,
                other => WorkspaceRange::Explicit(other.to_string()),
            });
        }

        if let Some(rest) = trimmed.strip_prefix(ALIAS_PREFIX) {
            // Scoped names start with '@', so the separator is the last '@'
            // past the first character.
            return match rest.rfind('@').filter(|idx| *idx > 0) {
                Some(idx) => Self::Alias {
                    name: rest[..idx].to_string(),
                    range: rest[idx + 1..].to_string(),
                },
                None => Self::Alias {
                    name: rest.to_string(),
                    range: "*".to_string(),
                },
            };
        }

        if let Ok(version) = Version::parse(trimmed) {
            return Self::Version(version);
        }

        if parse_npm_range(trimmed).is_some() {
            return Self::Range(trimmed.to_string());
        }

        if is_tag(trimmed) {
            Self::Tag(trimmed.to_string())
        } else {
            Self::Other(trimmed.to_string())
        }
    }

    /// Whether the specifier uses the workspace protocol.
    #[must_use]
    pub const fn is_workspace(&self) -> bool {
        matches!(self, Self::Workspace(_))
    }

    /// Whether the specifier is one of `workspace:*`, `workspace:~`, `workspace:^`.
    #[must_use]
    pub const fn is_workspace_wildcard(&self) -> bool {
        matches!(self, Self::Workspace(range) if range.is_wildcard())
    }

    /// The package this specifier resolves to, if it names a different one.
    #[must_use]
    pub fn alias_target(&self) -> Option<&str> {
        match self {
            Self::Alias { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The version-range portion, with any protocol prefix removed.
    ///
    /// Returns `None` for tags and other non-version specifiers.
    #[must_use]
    pub fn range_text(&self) -> Option<String> {
        match self {
            Self::Version(version) => Some(version.to_string()),
            Self::Range(range) => Some(range.clone()),
            Self::Workspace(WorkspaceRange::Any) => Some("*".to_string()),
            Self::Workspace(WorkspaceRange::Tilde) => Some("~".to_string()),
            Self::Workspace(WorkspaceRange::Caret) => Some("^".to_string()),
            Self::Workspace(WorkspaceRange::Explicit(range)) | Self::Alias { range, .. } => {
                Some(range.clone())
            }
            Self::Tag(_) | Self::Other(_) => None,
        }
    }

    /// Whether `version` satisfies this specifier.
    ///
    /// Workspace shorthands accept any version. Tags and other specifiers
    /// never match.
    #[must_use]
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            Self::Version(exact) => exact == version,
            Self::Range(range)
            | Self::Workspace(WorkspaceRange::Explicit(range))
            | Self::Alias { range, .. } => satisfies(version, range),
            Self::Workspace(_) => true,
            Self::Tag(_) | Self::Other(_) => false,
        }
    }
}

/// Whether `version` satisfies the npm `range`.
///
/// Unparseable ranges are never satisfied.
#[must_use]
pub fn satisfies(version: &Version, range: &str) -> bool {
    parse_npm_range(range).is_some_and(|alternatives| {
        alternatives
            .iter()
            .any(|requirement| requirement.matches(version))
    })
}

/// Parses an npm range into its `||` alternatives.
#[must_use]
pub fn parse_npm_range(range: &str) -> Option<Vec<VersionReq>> {
    range
        .split("||")
        .map(|alternative| {
            let normalized = normalize_alternative(alternative)?;
            VersionReq::parse(&normalized).ok()
        })
        .collect()
}

const OPERATORS: [&str; 7] = [">=", "<=", ">", "<", "=", "~", "^"];

fn normalize_alternative(alternative: &str) -> Option<String> {
    let tokens: Vec<&str> = alternative.split_whitespace().collect();
    if tokens.is_empty() {
        return Some("*".to_string());
    }

    if let [low, "-", high] = tokens.as_slice() {
        return Some(format!(
            ">={}, <={}",
            normalize_partial(low)?,
            normalize_partial(high)?
        ));
    }

    let mut comparators = Vec::with_capacity(tokens.len());
    let mut pending_op: Option<&str> = None;
    for token in tokens {
        if OPERATORS.contains(&token) {
            if pending_op.is_some() {
                return None;
            }
            pending_op = Some(token);
            continue;
        }
        let joined;
        let token = match pending_op.take() {
            Some(op) => {
                joined = format!("{op}{token}");
                joined.as_str()
            }
            None => token,
        };
        comparators.push(normalize_comparator(token)?);
    }
    if pending_op.is_some() {
        return None;
    }

    Some(comparators.join(", "))
}

fn normalize_comparator(token: &str) -> Option<String> {
    let split = token
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
        .unwrap_or(token.len());
    let (op, rest) = token.split_at(split);
    if !op.is_empty() && !OPERATORS.contains(&op) {
        return None;
    }
    let version = normalize_partial(rest)?;
    if version == "*" {
        return Some("*".to_string());
    }
    // A bare version is an exact match in npm; `=` keeps semver from
    // reading it as a caret requirement. Partial versions stay ranges.
    let op = if op.is_empty() { "=" } else { op };
    Some(format!("{op}{version}"))
}

/// Strips a `v` prefix and trailing `x`/`*` wildcard components.
fn normalize_partial(text: &str) -> Option<String> {
    let text = text.strip_prefix(['v', 'V']).unwrap_or(text);
    if text.is_empty() {
        return None;
    }
    let (core, suffix) = match text.find(['-', '+']) {
        Some(idx) => text.split_at(idx),
        None => (text, ""),
    };
    let mut parts = Vec::new();
    for part in core.split('.') {
        if matches!(part, "x" | "X" | "*") {
            break;
        }
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        parts.push(part);
    }
    if parts.is_empty() {
        return Some("*".to_string());
    }
    if parts.len() < 3 && !suffix.is_empty() {
        return None;
    }
    Some(format!("{}{suffix}", parts.join(".")))
}

fn is_tag(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!(
            DependencySpecifier::parse("1.2.3"),
            DependencySpecifier::Version(v("1.2.3"))
        );
        assert_eq!(
            DependencySpecifier::parse("^1.2.3"),
            DependencySpecifier::Range("^1.2.3".to_string())
        );
        assert_eq!(
            DependencySpecifier::parse(">=1.0.0 <2.0.0"),
            DependencySpecifier::Range(">=1.0.0 <2.0.0".to_string())
        );
        assert_eq!(
            DependencySpecifier::parse("workspace:*"),
            DependencySpecifier::Workspace(WorkspaceRange::Any)
        );
        assert_eq!(
            DependencySpecifier::parse("workspace:^1.0.0"),
            DependencySpecifier::Workspace(WorkspaceRange::Explicit("^1.0.0".to_string()))
        );
        assert_eq!(
            DependencySpecifier::parse("latest"),
            DependencySpecifier::Tag("latest".to_string())
        );
        assert!(matches!(
            DependencySpecifier::parse("file:../local"),
            DependencySpecifier::Other(_)
        ));
    }

    #[test]
    fn test_parse_scoped_alias() {
        let spec = DependencySpecifier::parse("npm:@scope/real@^2.0.0");
        assert_eq!(spec.alias_target(), Some("@scope/real"));
        assert_eq!(spec.range_text().as_deref(), Some("^2.0.0"));
        assert!(spec.satisfies(&v("2.3.0")));
        assert!(!spec.satisfies(&v("3.0.0")));
    }

    #[test]
    fn test_bare_version_is_exact() {
        assert!(satisfies(&v("1.0.0"), "1.0.0"));
        assert!(!satisfies(&v("1.0.1"), "1.0.0"));
    }

    #[test]
    fn test_caret_and_tilde() {
        assert!(satisfies(&v("1.9.0"), "^1.0.0"));
        assert!(!satisfies(&v("2.0.0"), "^1.0.0"));
        assert!(satisfies(&v("1.0.9"), "~1.0.0"));
        assert!(!satisfies(&v("1.1.0"), "~1.0.0"));
    }

    #[test]
    fn test_space_separated_comparators() {
        assert!(satisfies(&v("1.5.0"), ">=1.0.0 <2.0.0"));
        assert!(!satisfies(&v("2.0.0"), ">=1.0.0 <2.0.0"));
        assert!(satisfies(&v("1.5.0"), ">= 1.0.0 < 2.0.0"));
    }

    #[test]
    fn test_alternatives_and_wildcards() {
        assert!(satisfies(&v("3.1.0"), "^1.0.0 || 3.x"));
        assert!(!satisfies(&v("2.0.0"), "^1.0.0 || 3.x"));
        assert!(satisfies(&v("9.9.9"), "*"));
        assert!(satisfies(&v("9.9.9"), ""));
        assert!(satisfies(&v("1.2.7"), "1.2"));
    }

    #[test]
    fn test_hyphen_range() {
        assert!(satisfies(&v("1.5.0"), "1.0.0 - 2.0.0"));
        assert!(satisfies(&v("2.0.0"), "1.0.0 - 2.0.0"));
        assert!(!satisfies(&v("2.0.1"), "1.0.0 - 2.0.0"));
    }

    #[test]
    fn test_prerelease_matching() {
        assert!(satisfies(&v("1.0.0-hotfix.0"), "1.0.0-hotfix.0"));
        assert!(!satisfies(&v("1.0.1-beta.0"), "^1.0.0"));
    }

    #[test]
    fn test_workspace_satisfaction() {
        assert!(DependencySpecifier::parse("workspace:~").satisfies(&v("7.0.0")));
        assert!(DependencySpecifier::parse("workspace:^1.0.0").satisfies(&v("1.2.0")));
        assert!(!DependencySpecifier::parse("workspace:^1.0.0").satisfies(&v("2.0.0")));
        assert!(!DependencySpecifier::parse("next").satisfies(&v("1.0.0")));
    }

    #[test]
    fn test_garbage_ranges_never_match() {
        assert!(parse_npm_range(">= ").is_none());
        assert!(!satisfies(&v("1.0.0"), "not a range at all"));
    }
}

//! Scope catalog and the canonical comma-joined scope form.
//!
//! Raw scope strings arrive comma-joined and possibly malformed (`"view,,upload,view"`).
//! [`Scope::parse`] drops empty segments, unknown names and duplicates while keeping
//! first-occurrence order, so the string persisted and emitted is always canonical.
//! Two scopes compare equal when they hold the same names, regardless of order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A capability from the fixed catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeName {
    View,
    Upload,
    Note,
}

impl ScopeName {
    pub const CATALOG: [ScopeName; 3] = [ScopeName::View, ScopeName::Upload, ScopeName::Note];

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeName::View => "view",
            ScopeName::Upload => "upload",
            ScopeName::Note => "note",
        }
    }

    /// Human-readable description for the consent page.
    pub fn description(self) -> &'static str {
        match self {
            ScopeName::View => "View your data",
            ScopeName::Upload => "Upload data on your behalf",
            ScopeName::Note => "Comment on your data",
        }
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeName {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(ScopeName::View),
            "upload" => Ok(ScopeName::Upload),
            "note" => Ok(ScopeName::Note),
            other => Err(UnknownScope(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown scope: {0}")]
pub struct UnknownScope(pub String);

/// Deduplicated, catalog-filtered scope in first-occurrence order.
#[derive(Clone, Debug, Default)]
pub struct Scope(Vec<ScopeName>);

impl Scope {
    pub fn parse(raw: &str) -> Self {
        let mut names = Vec::new();
        for segment in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match segment.parse::<ScopeName>() {
                Ok(name) if !names.contains(&name) => names.push(name),
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "dropping scope outside the catalog"),
            }
        }
        Scope(names)
    }

    /// Every name in the catalog; granted to a developer's own seed grant.
    pub fn full() -> Self {
        Scope(ScopeName::CATALOG.to_vec())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ScopeName> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, name: ScopeName) -> bool {
        self.0.contains(&name)
    }

    pub fn is_subset_of(&self, other: &Scope) -> bool {
        self.iter().all(|name| other.contains(name))
    }

    pub fn names(&self) -> BTreeSet<ScopeName> {
        self.iter().collect()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.names() == other.names()
    }
}

impl Eq for Scope {}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for name in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(name.as_str())?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drops_empty_segments_and_duplicates() {
        let scope = Scope::parse(",view,,upload,view,");
        assert_eq!(scope.to_string(), "view,upload");
        assert_eq!(scope.names().len(), 2);
    }

    #[test]
    fn test_parse_filters_unknown_names() {
        let scope = Scope::parse("view,admin,upload,delete");
        assert_eq!(scope.to_string(), "view,upload");
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        let scope = Scope::parse("View,UPLOAD,note");
        assert_eq!(scope.to_string(), "note");
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(Scope::parse("").is_empty());
        assert!(Scope::parse(",,,").is_empty());
        assert_eq!(Scope::parse("").to_string(), "");
    }

    #[test]
    fn test_equality_ignores_order_and_duplicates() {
        assert_eq!(Scope::parse("view,upload"), Scope::parse("upload,view,upload"));
        assert_ne!(Scope::parse("view"), Scope::parse("view,upload"));
    }

    #[test]
    fn test_subset() {
        let full = Scope::full();
        assert!(Scope::parse("note,view").is_subset_of(&full));
        assert!(!full.is_subset_of(&Scope::parse("view")));
        assert!(Scope::default().is_subset_of(&Scope::parse("view")));
    }

    #[test]
    fn test_full_catalog_string() {
        assert_eq!(Scope::full().to_string(), "view,upload,note");
    }

    #[test]
    fn test_parse_is_idempotent_on_canonical_form() {
        let inputs = ["view", "upload,,view", "note,note,upload", ",", "x,view,y"];
        for raw in inputs {
            let once = Scope::parse(raw).to_string();
            let twice = Scope::parse(&once).to_string();
            assert_eq!(once, twice, "canonical form of {raw:?} changed on reparse");
        }
    }
}

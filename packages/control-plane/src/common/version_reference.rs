//! Symbolic version references: a literal version ID, or the reserved token
//! `latest` which resolves to the most recently created version.

pub const LATEST: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionReference {
    Latest,
    Named(String),
}

impl VersionReference {
    /// Parse a path segment into a version reference. The `latest` token is
    /// matched case-insensitively; anything else is a literal version ID.
    pub fn parse(version_ref_str: &str) -> Self {
        if version_ref_str.eq_ignore_ascii_case(LATEST) {
            VersionReference::Latest
        } else {
            VersionReference::Named(version_ref_str.to_string())
        }
    }
}

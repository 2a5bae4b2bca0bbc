//! Prefixed random identifiers for versions, invocations and executions.

use uuid::Uuid;

/// Mint a unique ID of the form `<prefix>-<32 hex chars>`.
///
/// The random component is a v4 UUID (122 random bits), so collisions are not
/// a practical concern even across restarts.
pub fn generate_random_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

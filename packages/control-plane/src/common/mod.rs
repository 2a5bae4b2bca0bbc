// Shared types and utilities used across the control plane.

pub mod errors;
pub mod ids;
pub mod offsets;
pub mod time;
pub mod types;
pub mod version_reference;

pub use errors::{ApiError, ErrorResponse};
pub use ids::generate_random_id;
pub use offsets::ListOffset;
pub use time::current_time;
pub use types::*;
pub use version_reference::VersionReference;

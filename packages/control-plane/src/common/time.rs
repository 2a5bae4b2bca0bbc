//! Wall-clock helper. All persisted times are unix seconds.

use chrono::Utc;

pub fn current_time() -> i64 {
    Utc::now().timestamp()
}

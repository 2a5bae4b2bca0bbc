//! The store: typed, transactional persistence over PostgreSQL.
//!
//! Each entity kind gets its own table struct with CRUD plus the
//! status-filtered scans the reconciler runs every tick. All tables share one
//! connection pool; multi-row mutations run inside a transaction, single-row
//! updates rely on conditional `WHERE` clauses.

mod executions;
mod existence;
mod functions;
mod invocations;
mod projects;
mod versions;

pub use executions::{ExecutionUpdate, ExecutionsTable};
pub use functions::FunctionsTable;
pub use invocations::InvocationsTable;
pub use projects::ProjectsTable;
pub use versions::VersionsTable;

use sqlx::PgPool;

use crate::common::ApiError;

/// Handle to all five tables. Cheap to clone; every clone shares the pool.
#[derive(Clone)]
pub struct DataStore {
    pub projects: ProjectsTable,
    pub versions: VersionsTable,
    pub functions: FunctionsTable,
    pub invocations: InvocationsTable,
    pub executions: ExecutionsTable,
}

impl DataStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            projects: ProjectsTable::new(pool.clone()),
            versions: VersionsTable::new(pool.clone()),
            functions: FunctionsTable::new(pool.clone()),
            invocations: InvocationsTable::new(pool.clone()),
            executions: ExecutionsTable::new(pool),
        }
    }
}

/// Map an insert failure onto the taxonomy: a unique violation means the
/// entity already exists, a foreign-key violation means an owner vanished
/// between the existence check and the insert.
pub(crate) fn map_insert_error(
    error: sqlx::Error,
    already_exists: ApiError,
    owner_missing: ApiError,
) -> ApiError {
    match &error {
        sqlx::Error::Database(db_error) if db_error.is_unique_violation() => already_exists,
        sqlx::Error::Database(db_error) if db_error.is_foreign_key_violation() => owner_missing,
        _ => ApiError::Database(error),
    }
}

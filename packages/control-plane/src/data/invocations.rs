//! Invocations table.
//!
//! Snapshots embed the owning function's specs (join) and, when a parent
//! reference is present, the parent's persisted cancellation stamp
//! (self-join) so the reconciler's classifiers run without extra lookups.

use std::collections::HashMap;

use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::executions::fetch_execution_summaries;
use super::existence::{ensure_function_exists, ensure_invocation_exists, invocation_exists};
use super::map_insert_error;
use crate::common::{
    ApiError, ExecutionOutcome, ExecutionSpec, ExecutionSummary, InvocationInfo,
    InvocationStatus, InvocationSummary, InvocationsListForFunction, ListOffset,
    ParentInvocationDefinition, ParentInvocationInfo, ResourceSpec, WorkerDetails, WorkerStatus,
};

const INVOCATION_COLUMNS: &str = "\
     i.project_name, i.version_id, i.function_name, i.invocation_id, \
     i.parent_function_name, i.parent_invocation_id, \
     p.cancellation_request_time AS parent_cancellation_request_time, \
     f.docker_image, f.resource_spec, f.execution_spec, \
     i.input, i.cancellation_request_time, i.invocation_status, \
     i.creation_time, i.last_update_time";

const INVOCATION_JOINS: &str = "\
     JOIN functions f \
       ON f.project_name = i.project_name \
      AND f.version_id = i.version_id \
      AND f.function_name = i.function_name \
     LEFT JOIN invocations p \
       ON p.project_name = i.project_name \
      AND p.version_id = i.version_id \
      AND p.function_name = i.parent_function_name \
      AND p.invocation_id = i.parent_invocation_id";

#[derive(Debug, FromRow)]
struct InvocationRow {
    project_name: String,
    version_id: String,
    function_name: String,
    invocation_id: String,
    parent_function_name: Option<String>,
    parent_invocation_id: Option<String>,
    parent_cancellation_request_time: Option<i64>,
    docker_image: String,
    #[sqlx(json)]
    resource_spec: ResourceSpec,
    #[sqlx(json)]
    execution_spec: ExecutionSpec,
    input: String,
    cancellation_request_time: Option<i64>,
    invocation_status: InvocationStatus,
    creation_time: i64,
    last_update_time: i64,
}

impl InvocationRow {
    fn into_info(self, executions: Vec<ExecutionSummary>) -> InvocationInfo {
        let parent_invocation = match (self.parent_function_name, self.parent_invocation_id) {
            (Some(function_name), Some(invocation_id)) => Some(ParentInvocationInfo {
                function_name,
                invocation_id,
                cancellation_request_time: self.parent_cancellation_request_time,
            }),
            _ => None,
        };

        InvocationInfo {
            project_name: self.project_name,
            version_id: self.version_id,
            function_name: self.function_name,
            invocation_id: self.invocation_id,
            parent_invocation,
            docker_image: self.docker_image,
            resource_spec: self.resource_spec,
            execution_spec: self.execution_spec,
            input: self.input,
            cancellation_request_time: self.cancellation_request_time,
            invocation_status: self.invocation_status,
            creation_time: self.creation_time,
            last_update_time: self.last_update_time,
            executions,
        }
    }
}

#[derive(Debug, FromRow)]
struct InvocationSummaryRow {
    project_name: String,
    version_id: String,
    function_name: String,
    invocation_id: String,
    parent_function_name: Option<String>,
    parent_invocation_id: Option<String>,
    cancellation_request_time: Option<i64>,
    invocation_status: InvocationStatus,
    creation_time: i64,
    last_update_time: i64,
}

impl From<InvocationSummaryRow> for InvocationSummary {
    fn from(row: InvocationSummaryRow) -> Self {
        let parent_invocation = match (row.parent_function_name, row.parent_invocation_id) {
            (Some(function_name), Some(invocation_id)) => Some(ParentInvocationDefinition {
                function_name,
                invocation_id,
            }),
            _ => None,
        };

        InvocationSummary {
            project_name: row.project_name,
            version_id: row.version_id,
            function_name: row.function_name,
            invocation_id: row.invocation_id,
            parent_invocation,
            cancellation_request_time: row.cancellation_request_time,
            invocation_status: row.invocation_status,
            creation_time: row.creation_time,
            last_update_time: row.last_update_time,
        }
    }
}

/// Summary row carrying its owning invocation's key, used to group the
/// executions of a whole status scan in one query.
#[derive(Debug, FromRow)]
struct KeyedExecutionSummaryRow {
    project_name: String,
    version_id: String,
    function_name: String,
    invocation_id: String,
    execution_id: String,
    worker_status: WorkerStatus,
    #[sqlx(json(nullable))]
    worker_details: Option<WorkerDetails>,
    termination_signal_time: Option<i64>,
    outcome: Option<ExecutionOutcome>,
    output: Option<String>,
    error_message: Option<String>,
    creation_time: i64,
    last_update_time: i64,
    execution_start_time: Option<i64>,
    execution_finish_time: Option<i64>,
}

#[derive(Clone)]
pub struct InvocationsTable {
    pool: PgPool,
}

impl InvocationsTable {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new invocation in RUNNING status. A parent reference, when
    /// given, must name an existing invocation of the same project version.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        invocation_id: &str,
        parent_invocation: Option<&ParentInvocationDefinition>,
        input: &str,
        creation_time: i64,
    ) -> Result<(), ApiError> {
        ensure_function_exists(&self.pool, project_name, version_id, function_name).await?;

        if let Some(parent) = parent_invocation {
            let parent_exists = invocation_exists(
                &self.pool,
                project_name,
                version_id,
                &parent.function_name,
                &parent.invocation_id,
            )
            .await?;

            if !parent_exists {
                return Err(ApiError::ParentInvocationDoesNotExist);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO invocations
              (project_name, version_id, function_name, invocation_id,
               parent_function_name, parent_invocation_id, input,
               cancellation_request_time, invocation_status, creation_time, last_update_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, 'running', $8, $8)
            "#,
        )
        .bind(project_name)
        .bind(version_id)
        .bind(function_name)
        .bind(invocation_id)
        .bind(parent_invocation.map(|parent| parent.function_name.as_str()))
        .bind(parent_invocation.map(|parent| parent.invocation_id.as_str()))
        .bind(input)
        .bind(creation_time)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            map_insert_error(
                error,
                ApiError::InvocationAlreadyExists,
                ApiError::FunctionDoesNotExist,
            )
        })?;

        Ok(())
    }

    /// Partial update. `set_cancellation_requested` stamps the cancellation
    /// time only if it is not already set, so repeated cancellations keep the
    /// original stamp.
    pub async fn update(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        invocation_id: &str,
        update_time: i64,
        set_cancellation_requested: bool,
        new_invocation_status: Option<InvocationStatus>,
    ) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE invocations
            SET last_update_time = $5,
                cancellation_request_time = CASE
                    WHEN $6 THEN COALESCE(cancellation_request_time, $5)
                    ELSE cancellation_request_time
                END,
                invocation_status = COALESCE($7, invocation_status)
            WHERE project_name = $1 AND version_id = $2
              AND function_name = $3 AND invocation_id = $4
            "#,
        )
        .bind(project_name)
        .bind(version_id)
        .bind(function_name)
        .bind(invocation_id)
        .bind(update_time)
        .bind(set_cancellation_requested)
        .bind(new_invocation_status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            ensure_invocation_exists(
                &self.pool,
                project_name,
                version_id,
                function_name,
                invocation_id,
            )
            .await?;
            return Err(ApiError::InvocationDoesNotExist);
        }

        Ok(())
    }

    pub async fn get(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        invocation_id: &str,
    ) -> Result<InvocationInfo, ApiError> {
        let row = sqlx::query_as::<_, InvocationRow>(&format!(
            r#"
            SELECT {INVOCATION_COLUMNS}
            FROM invocations i
            {INVOCATION_JOINS}
            WHERE i.project_name = $1 AND i.version_id = $2
              AND i.function_name = $3 AND i.invocation_id = $4
            "#
        ))
        .bind(project_name)
        .bind(version_id)
        .bind(function_name)
        .bind(invocation_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => {
                ensure_invocation_exists(
                    &self.pool,
                    project_name,
                    version_id,
                    function_name,
                    invocation_id,
                )
                .await?;
                return Err(ApiError::InvocationDoesNotExist);
            }
        };

        let executions = fetch_execution_summaries(
            &self.pool,
            project_name,
            version_id,
            function_name,
            invocation_id,
        )
        .await?;

        Ok(row.into_info(executions))
    }

    /// Page through invocations of one function, newest first. Always
    /// returns `next_offset` when more rows exist beyond this page.
    #[allow(clippy::too_many_arguments)]
    pub async fn list_for_function(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        max_results: u32,
        initial_offset: Option<&str>,
        status: Option<InvocationStatus>,
        parent_invocation: Option<&ParentInvocationDefinition>,
    ) -> Result<InvocationsListForFunction, ApiError> {
        ensure_function_exists(&self.pool, project_name, version_id, function_name).await?;

        let offset = match initial_offset {
            Some(serialised) => Some(ListOffset::deserialise(serialised)?),
            None => None,
        };

        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT project_name, version_id, function_name, invocation_id, \
             parent_function_name, parent_invocation_id, cancellation_request_time, \
             invocation_status, creation_time, last_update_time \
             FROM invocations WHERE project_name = ",
        );
        query.push_bind(project_name);
        query.push(" AND version_id = ");
        query.push_bind(version_id);
        query.push(" AND function_name = ");
        query.push_bind(function_name);

        if let Some(status) = status {
            query.push(" AND invocation_status = ");
            query.push_bind(status);
        }

        if let Some(parent) = parent_invocation {
            query.push(" AND parent_function_name = ");
            query.push_bind(parent.function_name.as_str());
            query.push(" AND parent_invocation_id = ");
            query.push_bind(parent.invocation_id.as_str());
        }

        if let Some(offset) = &offset {
            query.push(" AND (creation_time < ");
            query.push_bind(offset.next_creation_time);
            query.push(" OR (creation_time = ");
            query.push_bind(offset.next_creation_time);
            query.push(" AND invocation_id >= ");
            query.push_bind(offset.next_id.as_str());
            query.push("))");
        }

        query.push(" ORDER BY creation_time DESC, invocation_id ASC LIMIT ");
        query.push_bind(i64::from(max_results) + 1);

        let mut rows = query
            .build_query_as::<InvocationSummaryRow>()
            .fetch_all(&self.pool)
            .await?;

        let next_offset = if rows.len() > max_results as usize {
            let first_of_next_page = &rows[max_results as usize];
            let offset = ListOffset {
                next_creation_time: first_of_next_page.creation_time,
                next_id: first_of_next_page.invocation_id.clone(),
            };
            rows.truncate(max_results as usize);
            Some(offset.serialise())
        } else {
            None
        };

        Ok(InvocationsListForFunction {
            project_name: project_name.to_string(),
            version_id: version_id.to_string(),
            function_name: function_name.to_string(),
            invocations: rows.into_iter().map(InvocationSummary::from).collect(),
            next_offset,
        })
    }

    /// Scan all invocations with one of the given statuses, each with its
    /// executions embedded. The reconciler calls this with RUNNING only; a
    /// TERMINATED scan is unbounded.
    pub async fn list_all(
        &self,
        statuses: &[InvocationStatus],
    ) -> Result<Vec<InvocationInfo>, ApiError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        if statuses.contains(&InvocationStatus::Terminated) {
            tracing::warn!("scanning TERMINATED invocations; result set may be very large");
        }

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {INVOCATION_COLUMNS} FROM invocations i {INVOCATION_JOINS} \
             WHERE i.invocation_status IN ("
        ));
        let mut values = query.separated(", ");
        for status in statuses {
            values.push_bind(*status);
        }
        query.push(") ORDER BY i.creation_time ASC, i.invocation_id ASC");

        let rows = query
            .build_query_as::<InvocationRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut executions = self.fetch_executions_for_statuses(statuses).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let key = (
                    row.project_name.clone(),
                    row.version_id.clone(),
                    row.function_name.clone(),
                    row.invocation_id.clone(),
                );
                let owned = executions.remove(&key).unwrap_or_default();
                row.into_info(owned)
            })
            .collect())
    }

    /// One query for the executions of every invocation matched by a status
    /// scan, grouped by invocation key.
    async fn fetch_executions_for_statuses(
        &self,
        statuses: &[InvocationStatus],
    ) -> Result<HashMap<(String, String, String, String), Vec<ExecutionSummary>>, ApiError> {
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT e.project_name, e.version_id, e.function_name, e.invocation_id, \
             e.execution_id, e.worker_status, e.worker_details, e.termination_signal_time, \
             e.outcome, e.output, e.error_message, e.creation_time, e.last_update_time, \
             e.execution_start_time, e.execution_finish_time \
             FROM executions e \
             JOIN invocations i \
               ON i.project_name = e.project_name \
              AND i.version_id = e.version_id \
              AND i.function_name = e.function_name \
              AND i.invocation_id = e.invocation_id \
             WHERE i.invocation_status IN (",
        );
        let mut values = query.separated(", ");
        for status in statuses {
            values.push_bind(*status);
        }
        query.push(") ORDER BY e.creation_time ASC, e.execution_id ASC");

        let rows = query
            .build_query_as::<KeyedExecutionSummaryRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: HashMap<(String, String, String, String), Vec<ExecutionSummary>> =
            HashMap::new();

        for row in rows {
            let key = (
                row.project_name,
                row.version_id,
                row.function_name,
                row.invocation_id,
            );
            grouped.entry(key).or_default().push(ExecutionSummary {
                execution_id: row.execution_id,
                worker_status: row.worker_status,
                worker_details: row.worker_details,
                termination_signal_time: row.termination_signal_time,
                outcome: row.outcome,
                output: row.output,
                error_message: row.error_message,
                creation_time: row.creation_time,
                last_update_time: row.last_update_time,
                execution_start_time: row.execution_start_time,
                execution_finish_time: row.execution_finish_time,
            });
        }

        Ok(grouped)
    }
}

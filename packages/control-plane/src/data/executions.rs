//! Executions table.
//!
//! Updates are partial and guarded by optional preconditions on the start
//! and finish stamps, so workers cannot double-start or double-finalise an
//! attempt. The set-once columns (`termination_signal_time`,
//! `execution_finish_time`) are written with COALESCE.

use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::existence::ensure_invocation_exists;
use super::map_insert_error;
use crate::common::{
    ApiError, ExecutionInfo, ExecutionOutcome, ExecutionSummary, WorkerDetails, WorkerStatus,
};

const EXECUTION_COLUMNS: &str = "\
     e.project_name, e.version_id, e.function_name, e.invocation_id, e.execution_id, \
     i.input, i.cancellation_request_time, i.creation_time AS invocation_creation_time, \
     f.docker_image, f.resource_spec, f.execution_spec, f.prepared_function_details, \
     e.worker_status, e.worker_details, e.termination_signal_time, \
     e.outcome, e.output, e.error_message, \
     e.creation_time, e.last_update_time, e.execution_start_time, e.execution_finish_time";

const EXECUTION_JOINS: &str = "\
     JOIN invocations i \
       ON i.project_name = e.project_name \
      AND i.version_id = e.version_id \
      AND i.function_name = e.function_name \
      AND i.invocation_id = e.invocation_id \
     JOIN functions f \
       ON f.project_name = e.project_name \
      AND f.version_id = e.version_id \
      AND f.function_name = e.function_name";

/// Partial update of one execution, with optional optimistic preconditions.
///
/// `should_already_have_started`/`..._finished` assert the current state of
/// the corresponding stamp; a violated assertion surfaces as the matching
/// precondition error and nothing is written.
#[derive(Debug, Clone, Default)]
pub struct ExecutionUpdate {
    pub new_worker_status: Option<WorkerStatus>,
    pub new_worker_details: Option<WorkerDetails>,
    pub new_termination_signal_time: Option<i64>,
    pub new_outcome: Option<ExecutionOutcome>,
    pub new_output: Option<String>,
    pub new_error_message: Option<String>,
    pub new_execution_start_time: Option<i64>,
    pub new_execution_finish_time: Option<i64>,
    pub should_already_have_started: Option<bool>,
    pub should_already_have_finished: Option<bool>,
}

#[derive(Clone)]
pub struct ExecutionsTable {
    pool: PgPool,
}

impl ExecutionsTable {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new execution in PENDING worker status with no results yet.
    pub async fn create(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
        creation_time: i64,
    ) -> Result<(), ApiError> {
        ensure_invocation_exists(
            &self.pool,
            project_name,
            version_id,
            function_name,
            invocation_id,
        )
        .await?;

        sqlx::query(
            r#"
            INSERT INTO executions
              (project_name, version_id, function_name, invocation_id, execution_id,
               worker_status, worker_details, termination_signal_time,
               outcome, output, error_message,
               creation_time, last_update_time, execution_start_time, execution_finish_time)
            VALUES ($1, $2, $3, $4, $5, 'pending', NULL, NULL, NULL, NULL, NULL, $6, $6, NULL, NULL)
            "#,
        )
        .bind(project_name)
        .bind(version_id)
        .bind(function_name)
        .bind(invocation_id)
        .bind(execution_id)
        .bind(creation_time)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            map_insert_error(
                error,
                ApiError::ExecutionAlreadyExists,
                ApiError::InvocationDoesNotExist,
            )
        })?;

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
        update_time: i64,
        update: ExecutionUpdate,
    ) -> Result<(), ApiError> {
        let mut query = QueryBuilder::<Postgres>::new("UPDATE executions SET last_update_time = ");
        query.push_bind(update_time);

        if let Some(status) = update.new_worker_status {
            query.push(", worker_status = ");
            query.push_bind(status);
        }
        if let Some(details) = &update.new_worker_details {
            query.push(", worker_details = ");
            query.push_bind(Json(details.clone()));
        }
        if let Some(time) = update.new_termination_signal_time {
            // Set-once: a signal time already on the row wins.
            query.push(", termination_signal_time = COALESCE(termination_signal_time, ");
            query.push_bind(time);
            query.push(")");
        }
        if let Some(outcome) = update.new_outcome {
            query.push(", outcome = ");
            query.push_bind(outcome);
        }
        if let Some(output) = &update.new_output {
            query.push(", output = ");
            query.push_bind(output.clone());
        }
        if let Some(message) = &update.new_error_message {
            query.push(", error_message = ");
            query.push_bind(message.clone());
        }
        if let Some(time) = update.new_execution_start_time {
            query.push(", execution_start_time = ");
            query.push_bind(time);
        }
        if let Some(time) = update.new_execution_finish_time {
            query.push(", execution_finish_time = COALESCE(execution_finish_time, ");
            query.push_bind(time);
            query.push(")");
        }

        query.push(" WHERE project_name = ");
        query.push_bind(project_name);
        query.push(" AND version_id = ");
        query.push_bind(version_id);
        query.push(" AND function_name = ");
        query.push_bind(function_name);
        query.push(" AND invocation_id = ");
        query.push_bind(invocation_id);
        query.push(" AND execution_id = ");
        query.push_bind(execution_id);

        if let Some(started) = update.should_already_have_started {
            query.push(if started {
                " AND execution_start_time IS NOT NULL"
            } else {
                " AND execution_start_time IS NULL"
            });
        }
        if let Some(finished) = update.should_already_have_finished {
            query.push(if finished {
                " AND execution_finish_time IS NOT NULL"
            } else {
                " AND execution_finish_time IS NULL"
            });
        }

        let result = query.build().execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(self
                .diagnose_failed_update(
                    project_name,
                    version_id,
                    function_name,
                    invocation_id,
                    execution_id,
                    &update,
                )
                .await);
        }

        Ok(())
    }

    /// An update matched no row: either the execution is missing (cascade to
    /// the outermost missing owner) or one of the preconditions failed.
    async fn diagnose_failed_update(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
        update: &ExecutionUpdate,
    ) -> ApiError {
        let stamps: Result<Option<(Option<i64>, Option<i64>)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT execution_start_time, execution_finish_time
            FROM executions
            WHERE project_name = $1 AND version_id = $2 AND function_name = $3
              AND invocation_id = $4 AND execution_id = $5
            "#,
        )
        .bind(project_name)
        .bind(version_id)
        .bind(function_name)
        .bind(invocation_id)
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await;

        let (start_time, finish_time) = match stamps {
            Ok(Some(row)) => row,
            Ok(None) => {
                let check = ensure_invocation_exists(
                    &self.pool,
                    project_name,
                    version_id,
                    function_name,
                    invocation_id,
                )
                .await;
                return match check {
                    Ok(()) => ApiError::ExecutionDoesNotExist,
                    Err(error) => error,
                };
            }
            Err(error) => return ApiError::Database(error),
        };

        match update.should_already_have_started {
            Some(true) if start_time.is_none() => return ApiError::ExecutionHasNotStarted,
            Some(false) if start_time.is_some() => return ApiError::ExecutionHasAlreadyStarted,
            _ => {}
        }

        match update.should_already_have_finished {
            Some(true) if finish_time.is_none() => return ApiError::ExecutionHasNotFinished,
            Some(false) if finish_time.is_some() => return ApiError::ExecutionHasAlreadyFinished,
            _ => {}
        }

        // The row reappeared or a concurrent writer resolved the conflict
        // between our UPDATE and this diagnosis; report the row as gone so
        // the caller retries its read.
        ApiError::ExecutionDoesNotExist
    }

    pub async fn get(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
    ) -> Result<ExecutionInfo, ApiError> {
        let execution = sqlx::query_as::<_, ExecutionInfo>(&format!(
            r#"
            SELECT {EXECUTION_COLUMNS}
            FROM executions e
            {EXECUTION_JOINS}
            WHERE e.project_name = $1 AND e.version_id = $2 AND e.function_name = $3
              AND e.invocation_id = $4 AND e.execution_id = $5
            "#
        ))
        .bind(project_name)
        .bind(version_id)
        .bind(function_name)
        .bind(invocation_id)
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        match execution {
            Some(execution) => Ok(execution),
            None => {
                ensure_invocation_exists(
                    &self.pool,
                    project_name,
                    version_id,
                    function_name,
                    invocation_id,
                )
                .await?;
                Err(ApiError::ExecutionDoesNotExist)
            }
        }
    }

    pub async fn list_for_invocation(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        invocation_id: &str,
    ) -> Result<Vec<ExecutionSummary>, ApiError> {
        ensure_invocation_exists(
            &self.pool,
            project_name,
            version_id,
            function_name,
            invocation_id,
        )
        .await?;

        let executions = fetch_execution_summaries(
            &self.pool,
            project_name,
            version_id,
            function_name,
            invocation_id,
        )
        .await?;

        Ok(executions)
    }

    /// Scan all executions with one of the given worker statuses. An empty
    /// set short-circuits; a TERMINATED scan is legal but unbounded.
    pub async fn list_all(
        &self,
        worker_statuses: &[WorkerStatus],
    ) -> Result<Vec<ExecutionInfo>, ApiError> {
        if worker_statuses.is_empty() {
            return Ok(Vec::new());
        }

        if worker_statuses.contains(&WorkerStatus::Terminated) {
            tracing::warn!("scanning TERMINATED executions; result set may be very large");
        }

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EXECUTION_COLUMNS} FROM executions e {EXECUTION_JOINS} \
             WHERE e.worker_status IN ("
        ));
        let mut values = query.separated(", ");
        for status in worker_statuses {
            values.push_bind(*status);
        }
        query.push(") ORDER BY e.creation_time ASC, e.execution_id ASC");

        let executions = query
            .build_query_as::<ExecutionInfo>()
            .fetch_all(&self.pool)
            .await?;

        Ok(executions)
    }
}

/// Executions of one invocation in creation order, shared with the
/// invocations table for embedding into invocation snapshots.
pub(crate) async fn fetch_execution_summaries(
    pool: &PgPool,
    project_name: &str,
    version_id: &str,
    function_name: &str,
    invocation_id: &str,
) -> Result<Vec<ExecutionSummary>, sqlx::Error> {
    sqlx::query_as::<_, ExecutionSummary>(
        r#"
        SELECT execution_id, worker_status, worker_details, termination_signal_time,
               outcome, output, error_message,
               creation_time, last_update_time, execution_start_time, execution_finish_time
        FROM executions
        WHERE project_name = $1 AND version_id = $2 AND function_name = $3 AND invocation_id = $4
        ORDER BY creation_time ASC, execution_id ASC
        "#,
    )
    .bind(project_name)
    .bind(version_id)
    .bind(function_name)
    .bind(invocation_id)
    .fetch_all(pool)
    .await
}

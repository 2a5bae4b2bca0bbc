//! Functions table.

use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::existence::{ensure_function_exists, ensure_version_exists};
use super::map_insert_error;
use crate::common::{
    ApiError, ExecutionSpec, FunctionInfo, FunctionInfoForVersion, FunctionStatus,
    PreparedFunctionDetails, ResourceSpec,
};

const FUNCTION_COLUMNS: &str = "project_name, version_id, function_name, docker_image, \
     resource_spec, execution_spec, function_status, prepared_function_details";

#[derive(Clone)]
pub struct FunctionsTable {
    pool: PgPool,
}

impl FunctionsTable {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        docker_image: &str,
        resource_spec: &ResourceSpec,
        execution_spec: &ExecutionSpec,
        function_status: FunctionStatus,
        prepared_function_details: Option<&PreparedFunctionDetails>,
    ) -> Result<(), ApiError> {
        ensure_version_exists(&self.pool, project_name, version_id).await?;

        sqlx::query(
            r#"
            INSERT INTO functions
              (project_name, version_id, function_name, docker_image,
               resource_spec, execution_spec, function_status, prepared_function_details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(project_name)
        .bind(version_id)
        .bind(function_name)
        .bind(docker_image)
        .bind(Json(resource_spec))
        .bind(Json(execution_spec))
        .bind(function_status)
        .bind(prepared_function_details.map(Json))
        .execute(&self.pool)
        .await
        .map_err(|error| {
            map_insert_error(
                error,
                ApiError::FunctionAlreadyExists,
                ApiError::VersionDoesNotExist,
            )
        })?;

        Ok(())
    }

    /// Partial update of status and/or prepared details.
    pub async fn update(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        new_function_status: Option<FunctionStatus>,
        new_prepared_function_details: Option<&PreparedFunctionDetails>,
    ) -> Result<(), ApiError> {
        ensure_version_exists(&self.pool, project_name, version_id).await?;

        if new_function_status.is_none() && new_prepared_function_details.is_none() {
            return ensure_function_exists(&self.pool, project_name, version_id, function_name)
                .await;
        }

        let mut query = QueryBuilder::<Postgres>::new("UPDATE functions SET ");
        let mut assignments = query.separated(", ");

        if let Some(status) = new_function_status {
            assignments.push("function_status = ");
            assignments.push_bind_unseparated(status);
        }
        if let Some(details) = new_prepared_function_details {
            assignments.push("prepared_function_details = ");
            assignments.push_bind_unseparated(Json(details.clone()));
        }

        query.push(" WHERE project_name = ");
        query.push_bind(project_name);
        query.push(" AND version_id = ");
        query.push_bind(version_id);
        query.push(" AND function_name = ");
        query.push_bind(function_name);

        let result = query.build().execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::FunctionDoesNotExist);
        }

        Ok(())
    }

    pub async fn get(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
    ) -> Result<FunctionInfo, ApiError> {
        ensure_version_exists(&self.pool, project_name, version_id).await?;

        let function = sqlx::query_as::<_, FunctionInfo>(&format!(
            r#"
            SELECT {FUNCTION_COLUMNS}
            FROM functions
            WHERE project_name = $1 AND version_id = $2 AND function_name = $3
            "#
        ))
        .bind(project_name)
        .bind(version_id)
        .bind(function_name)
        .fetch_optional(&self.pool)
        .await?;

        function.ok_or(ApiError::FunctionDoesNotExist)
    }

    pub async fn list_for_version(
        &self,
        project_name: &str,
        version_id: &str,
    ) -> Result<Vec<FunctionInfoForVersion>, ApiError> {
        ensure_version_exists(&self.pool, project_name, version_id).await?;

        let functions = sqlx::query_as::<_, FunctionInfoForVersion>(
            r#"
            SELECT function_name, docker_image, resource_spec, execution_spec,
                   function_status, prepared_function_details
            FROM functions
            WHERE project_name = $1 AND version_id = $2
            ORDER BY function_name ASC
            "#,
        )
        .bind(project_name)
        .bind(version_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(functions)
    }

    /// Scan all functions across all projects with one of the given statuses.
    /// An empty status set short-circuits to an empty result rather than
    /// producing a malformed `IN ()` clause.
    pub async fn list_all(
        &self,
        statuses: &[FunctionStatus],
    ) -> Result<Vec<FunctionInfo>, ApiError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {FUNCTION_COLUMNS} FROM functions WHERE function_status IN ("
        ));
        let mut values = query.separated(", ");
        for status in statuses {
            values.push_bind(*status);
        }
        query.push(") ORDER BY project_name ASC, version_id ASC, function_name ASC");

        let functions = query
            .build_query_as::<FunctionInfo>()
            .fetch_all(&self.pool)
            .await?;

        Ok(functions)
    }
}

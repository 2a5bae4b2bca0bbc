//! Project versions table. Versions are immutable once created.

use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use super::existence::ensure_project_exists;
use super::map_insert_error;
use crate::common::{
    ApiError, FunctionInfoForVersion, FunctionStatus, VersionDefinition, VersionInfo,
    VersionInfoForProject, VersionsListForProject,
};

#[derive(Debug, FromRow)]
struct VersionRow {
    project_name: String,
    version_id: String,
    creation_time: i64,
}

#[derive(Clone)]
pub struct VersionsTable {
    pool: PgPool,
}

impl VersionsTable {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        project_name: &str,
        version_id: &str,
        creation_time: i64,
    ) -> Result<(), ApiError> {
        ensure_project_exists(&self.pool, project_name).await?;

        sqlx::query(
            r#"
            INSERT INTO project_versions (project_name, version_id, creation_time)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(project_name)
        .bind(version_id)
        .bind(creation_time)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            map_insert_error(
                error,
                ApiError::VersionAlreadyExists,
                ApiError::ProjectDoesNotExist,
            )
        })?;

        Ok(())
    }

    /// Register a version together with one PENDING function row per declared
    /// function, in a single transaction. A duplicate function name inside
    /// the definition surfaces as `FunctionAlreadyExists` and rolls the whole
    /// version back.
    pub async fn create_with_functions(
        &self,
        project_name: &str,
        version_id: &str,
        creation_time: i64,
        definition: &VersionDefinition,
    ) -> Result<(), ApiError> {
        ensure_project_exists(&self.pool, project_name).await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO project_versions (project_name, version_id, creation_time)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(project_name)
        .bind(version_id)
        .bind(creation_time)
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            map_insert_error(
                error,
                ApiError::VersionAlreadyExists,
                ApiError::ProjectDoesNotExist,
            )
        })?;

        for function in &definition.functions {
            sqlx::query(
                r#"
                INSERT INTO functions
                  (project_name, version_id, function_name, docker_image,
                   resource_spec, execution_spec, function_status, prepared_function_details)
                VALUES ($1, $2, $3, $4, $5, $6, $7, NULL)
                "#,
            )
            .bind(project_name)
            .bind(version_id)
            .bind(&function.function_name)
            .bind(definition.docker_image_for(function))
            .bind(Json(&function.resource_spec))
            .bind(Json(&function.execution_spec))
            .bind(FunctionStatus::Pending)
            .execute(&mut *tx)
            .await
            .map_err(|error| {
                map_insert_error(
                    error,
                    ApiError::FunctionAlreadyExists,
                    ApiError::VersionDoesNotExist,
                )
            })?;
        }

        tx.commit().await?;

        Ok(())
    }

    pub async fn get(&self, project_name: &str, version_id: &str) -> Result<VersionInfo, ApiError> {
        ensure_project_exists(&self.pool, project_name).await?;

        let version = sqlx::query_as::<_, VersionRow>(
            r#"
            SELECT project_name, version_id, creation_time
            FROM project_versions
            WHERE project_name = $1 AND version_id = $2
            "#,
        )
        .bind(project_name)
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApiError::VersionDoesNotExist)?;

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

        Ok(VersionInfo {
            project_name: version.project_name,
            version_id: version.version_id,
            creation_time: version.creation_time,
            functions,
        })
    }

    /// The version with the greatest creation time; ties break towards the
    /// lexicographically smallest ID so the answer is stable.
    pub async fn get_id_of_latest(&self, project_name: &str) -> Result<String, ApiError> {
        ensure_project_exists(&self.pool, project_name).await?;

        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT version_id
            FROM project_versions
            WHERE project_name = $1
            ORDER BY creation_time DESC, version_id ASC
            LIMIT 1
            "#,
        )
        .bind(project_name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((version_id,)) => Ok(version_id),
            None => Err(ApiError::VersionDoesNotExist),
        }
    }

    pub async fn list_for_project(
        &self,
        project_name: &str,
    ) -> Result<VersionsListForProject, ApiError> {
        ensure_project_exists(&self.pool, project_name).await?;

        let versions = sqlx::query_as::<_, VersionInfoForProject>(
            r#"
            SELECT version_id, creation_time
            FROM project_versions
            WHERE project_name = $1
            ORDER BY creation_time DESC, version_id ASC
            "#,
        )
        .bind(project_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(VersionsListForProject {
            project_name: project_name.to_string(),
            versions,
        })
    }
}

//! Projects table.

use sqlx::PgPool;

use super::map_insert_error;
use crate::common::{ApiError, ProjectInfo, ProjectsList};

#[derive(Clone)]
pub struct ProjectsTable {
    pool: PgPool,
}

impl ProjectsTable {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, project_name: &str, creation_time: i64) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO projects (project_name, deletion_request_time, creation_time)
            VALUES ($1, NULL, $2)
            "#,
        )
        .bind(project_name)
        .bind(creation_time)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            map_insert_error(
                error,
                ApiError::ProjectAlreadyExists,
                ApiError::ProjectDoesNotExist,
            )
        })?;

        Ok(())
    }

    pub async fn get(&self, project_name: &str) -> Result<ProjectInfo, ApiError> {
        let project = sqlx::query_as::<_, ProjectInfo>(
            r#"
            SELECT project_name, deletion_request_time, creation_time
            FROM projects
            WHERE project_name = $1
            "#,
        )
        .bind(project_name)
        .fetch_optional(&self.pool)
        .await?;

        project.ok_or(ApiError::ProjectDoesNotExist)
    }

    pub async fn list(&self) -> Result<ProjectsList, ApiError> {
        let projects = sqlx::query_as::<_, ProjectInfo>(
            r#"
            SELECT project_name, deletion_request_time, creation_time
            FROM projects
            ORDER BY creation_time DESC, project_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ProjectsList { projects })
    }

    /// Mark the project for deletion. Idempotent: the stamp is only written
    /// the first time, so repeated requests keep the original time.
    pub async fn request_deletion(&self, project_name: &str, time: i64) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET deletion_request_time = COALESCE(deletion_request_time, $2)
            WHERE project_name = $1
            "#,
        )
        .bind(project_name)
        .bind(time)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::ProjectDoesNotExist);
        }

        Ok(())
    }

    /// Remove the project together with all owned versions, functions,
    /// invocations and executions. The schema's cascading foreign keys make
    /// this a single atomic statement.
    pub async fn delete_with_cascade(&self, project_name: &str) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM projects WHERE project_name = $1")
            .bind(project_name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::ProjectDoesNotExist);
        }

        Ok(())
    }
}

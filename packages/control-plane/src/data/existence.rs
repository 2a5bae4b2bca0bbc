//! Cascading existence checks.
//!
//! When an entity lookup fails, the caller should learn about the outermost
//! missing owner: asking for an invocation in a project that does not exist
//! raises `ProjectDoesNotExist`, not `InvocationDoesNotExist`.

use sqlx::PgPool;

use crate::common::ApiError;

pub(crate) async fn project_exists(
    pool: &PgPool,
    project_name: &str,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM projects WHERE project_name = $1")
        .bind(project_name)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

pub(crate) async fn version_exists(
    pool: &PgPool,
    project_name: &str,
    version_id: &str,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT 1 FROM project_versions WHERE project_name = $1 AND version_id = $2",
    )
    .bind(project_name)
    .bind(version_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

pub(crate) async fn function_exists(
    pool: &PgPool,
    project_name: &str,
    version_id: &str,
    function_name: &str,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT 1
        FROM functions
        WHERE project_name = $1 AND version_id = $2 AND function_name = $3
        "#,
    )
    .bind(project_name)
    .bind(version_id)
    .bind(function_name)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

pub(crate) async fn invocation_exists(
    pool: &PgPool,
    project_name: &str,
    version_id: &str,
    function_name: &str,
    invocation_id: &str,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT 1
        FROM invocations
        WHERE project_name = $1 AND version_id = $2 AND function_name = $3 AND invocation_id = $4
        "#,
    )
    .bind(project_name)
    .bind(version_id)
    .bind(function_name)
    .bind(invocation_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

pub(crate) async fn ensure_project_exists(
    pool: &PgPool,
    project_name: &str,
) -> Result<(), ApiError> {
    if !project_exists(pool, project_name).await? {
        return Err(ApiError::ProjectDoesNotExist);
    }
    Ok(())
}

pub(crate) async fn ensure_version_exists(
    pool: &PgPool,
    project_name: &str,
    version_id: &str,
) -> Result<(), ApiError> {
    if !version_exists(pool, project_name, version_id).await? {
        // It could be that the project itself is missing, not just the version.
        ensure_project_exists(pool, project_name).await?;
        return Err(ApiError::VersionDoesNotExist);
    }
    Ok(())
}

pub(crate) async fn ensure_function_exists(
    pool: &PgPool,
    project_name: &str,
    version_id: &str,
    function_name: &str,
) -> Result<(), ApiError> {
    if !function_exists(pool, project_name, version_id, function_name).await? {
        ensure_version_exists(pool, project_name, version_id).await?;
        return Err(ApiError::FunctionDoesNotExist);
    }
    Ok(())
}

pub(crate) async fn ensure_invocation_exists(
    pool: &PgPool,
    project_name: &str,
    version_id: &str,
    function_name: &str,
    invocation_id: &str,
) -> Result<(), ApiError> {
    if !invocation_exists(pool, project_name, version_id, function_name, invocation_id).await? {
        ensure_function_exists(pool, project_name, version_id, function_name).await?;
        return Err(ApiError::InvocationDoesNotExist);
    }
    Ok(())
}

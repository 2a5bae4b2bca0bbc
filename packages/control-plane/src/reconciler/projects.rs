//! Project garbage collection: once a project is marked for deletion and no
//! invocation of it is still RUNNING, the whole ownership tree goes.

use std::collections::HashSet;

use tracing::{error, info};

use crate::common::{ApiError, InvocationInfo, InvocationStatus, ProjectInfo};
use crate::data::DataStore;

#[derive(Debug, Default)]
pub(crate) struct ProjectDeletionClassification {
    pub to_delete: Vec<ProjectInfo>,
    pub to_leave_untouched: Vec<ProjectInfo>,
}

pub(crate) fn classify_projects_for_deletion(
    projects: Vec<ProjectInfo>,
    running_invocations: &[InvocationInfo],
) -> ProjectDeletionClassification {
    let projects_with_running_invocations: HashSet<&str> = running_invocations
        .iter()
        .map(|invocation| invocation.project_name.as_str())
        .collect();

    let mut classification = ProjectDeletionClassification::default();

    for project in projects {
        let still_busy =
            projects_with_running_invocations.contains(project.project_name.as_str());

        if project.deletion_requested() && !still_busy {
            classification.to_delete.push(project);
        } else {
            classification.to_leave_untouched.push(project);
        }
    }

    classification
}

pub(crate) async fn collect_deletable_projects(store: &DataStore) -> Result<(), ApiError> {
    let projects = store.projects.list().await?.projects;
    let running_invocations = store
        .invocations
        .list_all(&[InvocationStatus::Running])
        .await?;

    let classification = classify_projects_for_deletion(projects, &running_invocations);

    for project in classification.to_delete {
        match store.projects.delete_with_cascade(&project.project_name).await {
            Ok(()) => info!(
                project_name = %project.project_name,
                "project deleted with all versions, functions, invocations and executions"
            ),
            Err(err) => error!(
                project_name = %project.project_name,
                error = %err,
                "failed to delete project"
            ),
        }
    }

    Ok(())
}

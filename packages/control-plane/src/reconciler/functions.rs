//! Functions pass: drive PENDING functions to READY by asking the
//! provisioner to prepare cloud-side resources for them.

use tracing::{error, info};

use crate::common::{ApiError, FunctionStatus};
use crate::data::DataStore;
use crate::provisioning::Provisioner;

pub(crate) async fn prepare_pending_functions(
    store: &DataStore,
    provisioner: &dyn Provisioner,
) -> Result<(), ApiError> {
    let pending_functions = store.functions.list_all(&[FunctionStatus::Pending]).await?;

    for function in pending_functions {
        let prepared_details = match provisioner
            .prepare_function(
                &function.project_name,
                &function.version_id,
                &function.function_name,
                &function.docker_image,
                &function.resource_spec,
            )
            .await
        {
            Ok(details) => details,
            Err(err) => {
                // Transient by assumption; the function stays PENDING and is
                // retried next tick.
                error!(
                    project_name = %function.project_name,
                    version_id = %function.version_id,
                    function_name = %function.function_name,
                    error = %err,
                    "failed to prepare function"
                );
                continue;
            }
        };

        let update = store
            .functions
            .update(
                &function.project_name,
                &function.version_id,
                &function.function_name,
                Some(FunctionStatus::Ready),
                Some(&prepared_details),
            )
            .await;

        match update {
            Ok(()) => info!(
                project_name = %function.project_name,
                version_id = %function.version_id,
                function_name = %function.function_name,
                "function ready"
            ),
            Err(err) => error!(
                project_name = %function.project_name,
                version_id = %function.version_id,
                function_name = %function.function_name,
                error = %err,
                "failed to mark function ready"
            ),
        }
    }

    Ok(())
}

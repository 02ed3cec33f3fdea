use std::fmt::Debug;

use kube::{api::PostParams, core::object::HasStatus, Api};
use log::debug;
use serde::{de::DeserializeOwned, Serialize};

use crate::helpers::pretty_type_name;

const CONFLICT_STATUS_CODE: u16 = 409;

/// Outcome of a status write keyed to an observed resource version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWriteOutcome {
    /// the API server accepted the write
    Applied,
    /// another writer changed the object first and this write was discarded
    Superseded,
}

/// Replaces the status subresource of `object` with `status`. The write
/// carries the resource version the caller observed, so it only lands if
/// nothing else changed the object in the meantime. Losing that race is
/// reported as `Superseded`, not as an error.
pub async fn replace_resource_status<T>(
    api: &Api<T>,
    name: &str,
    object: &T,
    status: T::Status,
) -> Result<StatusWriteOutcome, kube::Error>
where
    T: HasStatus + Serialize + Clone + DeserializeOwned + Debug,
{
    let mut object = object.clone();
    *object.status_mut() = Some(status);

    let data = serde_json::to_vec(&object).map_err(kube::Error::SerdeError)?;

    match api.replace_status(name, &PostParams::default(), data).await {
        Ok(_) => Ok(StatusWriteOutcome::Applied),
        Err(error) if is_write_conflict(&error) => {
            debug!(
                "'{name}' {} changed before its status write landed, discarding it",
                pretty_type_name::<T>()
            );

            Ok(StatusWriteOutcome::Superseded)
        }
        Err(error) => Err(error),
    }
}

fn is_write_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == CONFLICT_STATUS_CODE)
}

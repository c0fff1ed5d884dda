use crate::shared::ReservationId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub mod file_backend;
pub mod http_client;

pub use file_backend::FileSandboxApi;
pub use http_client::SandboxApiClient;

/// Attribute name to value, as stored on one resource.
pub type Attributes = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("resource `{resource}` is not part of reservation `{reservation}`")]
    UnknownResource {
        reservation: String,
        resource: String,
    },
    #[error("value is not a known encrypted token")]
    NotEncrypted,
    #[error("custom data for reservation `{reservation}` changed concurrently")]
    CustomDataConflict { reservation: String },
    #[error("custom data for reservation `{reservation}` is locked by pid {pid}")]
    CustomDataLocked { reservation: String, pid: u32 },
    #[error("custom data for reservation `{reservation}` is being locked by another writer")]
    CustomDataLockPending { reservation: String },
    #[error("sandbox api request failed: {0}")]
    Request(String),
    #[error("sandbox api rejected request: {0}")]
    Response(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One resource inside one reservation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceScope {
    pub reservation_id: ReservationId,
    pub resource_name: String,
}

impl ResourceScope {
    pub fn new(reservation_id: ReservationId, resource_name: impl Into<String>) -> Self {
        Self {
            reservation_id,
            resource_name: resource_name.into(),
        }
    }
}

impl std::fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.reservation_id, self.resource_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeWriteRequest {
    #[serde(rename = "name")]
    pub attribute_name: String,
    pub value: String,
}

impl AttributeWriteRequest {
    pub fn new(attribute_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            value: value.into(),
        }
    }
}

pub trait AttributeApi {
    fn get_attributes(&self, scope: &ResourceScope) -> Result<Attributes, ApiError>;

    /// Applies every request in one call; callers rely on the batch becoming
    /// visible as a single update.
    fn set_attributes(
        &self,
        scope: &ResourceScope,
        requests: &[AttributeWriteRequest],
    ) -> Result<(), ApiError>;

    fn decrypt_password(&self, value: &str) -> Result<String, ApiError>;
}

pub trait CustomDataApi {
    fn get_custom_data(&self, reservation: &ReservationId) -> Result<Option<String>, ApiError>;

    fn set_custom_data(&self, reservation: &ReservationId, blob: &str) -> Result<(), ApiError>;

    /// Replaces the blob only if the stored one still equals `expected`.
    ///
    /// The provided implementation is a plain read-compare-write; backends
    /// that can do better (locking, conditional requests) override it.
    fn compare_and_set_custom_data(
        &self,
        reservation: &ReservationId,
        expected: Option<&str>,
        blob: &str,
    ) -> Result<(), ApiError> {
        let current = self.get_custom_data(reservation)?;
        if current.as_deref() != expected {
            return Err(ApiError::CustomDataConflict {
                reservation: reservation.to_string(),
            });
        }
        self.set_custom_data(reservation, blob)
    }
}

/// Operator-facing message stream of a reservation.
pub trait OperatorChannel {
    fn write_reservation_message(
        &self,
        reservation: &ReservationId,
        message: &str,
    ) -> Result<(), ApiError>;
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> ApiError {
    ApiError::Io {
        path: path.display().to_string(),
        source,
    }
}

pub(crate) fn json_error(path: &Path, source: serde_json::Error) -> ApiError {
    ApiError::Json {
        path: path.display().to_string(),
        source,
    }
}

use crate::api::{
    io_error, json_error, ApiError, AttributeApi, AttributeWriteRequest, Attributes,
    CustomDataApi, OperatorChannel, ResourceScope,
};
use crate::shared::{atomic_write_file, ReservationId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};

const LOCK_PID_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ResourceFile {
    #[serde(default)]
    attributes: Attributes,
}

/// Sandbox API backed by plain files under a state root.
///
/// Layout:
/// - `attributes/<reservation>/<resource>.json` holds resource attributes
/// - `secrets.json` maps encrypted tokens to their plaintext
/// - `sandboxes/<reservation>.json` holds the custom-data blob
/// - `sandboxes/<reservation>.output.log` collects operator messages
#[derive(Debug, Clone)]
pub struct FileSandboxApi {
    root: PathBuf,
}

impl FileSandboxApi {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resource_path(&self, scope: &ResourceScope) -> PathBuf {
        self.root
            .join("attributes")
            .join(scope.reservation_id.as_str())
            .join(format!("{}.json", urlencoding::encode(&scope.resource_name)))
    }

    pub fn custom_data_path(&self, reservation: &ReservationId) -> PathBuf {
        self.root
            .join("sandboxes")
            .join(format!("{reservation}.json"))
    }

    pub fn output_log_path(&self, reservation: &ReservationId) -> PathBuf {
        self.root
            .join("sandboxes")
            .join(format!("{reservation}.output.log"))
    }

    fn lock_path(&self, reservation: &ReservationId) -> PathBuf {
        self.root
            .join("sandboxes")
            .join(format!("{reservation}.lock"))
    }

    fn secrets_path(&self) -> PathBuf {
        self.root.join("secrets.json")
    }

    /// Creates or replaces the whole attribute set of a resource.
    pub fn put_attributes(
        &self,
        scope: &ResourceScope,
        attributes: Attributes,
    ) -> Result<(), ApiError> {
        self.write_resource(scope, &ResourceFile { attributes })
    }

    /// Registers an encrypted token that `decrypt_password` resolves.
    pub fn put_secret(&self, token: &str, plaintext: &str) -> Result<(), ApiError> {
        let path = self.secrets_path();
        let mut secrets = self.load_secrets()?;
        secrets.insert(token.to_string(), plaintext.to_string());
        let body = serde_json::to_vec_pretty(&secrets).map_err(|e| json_error(&path, e))?;
        atomic_write_file(&path, &body).map_err(|e| io_error(&path, e))
    }

    pub fn read_reservation_messages(
        &self,
        reservation: &ReservationId,
    ) -> Result<Vec<String>, ApiError> {
        let path = self.output_log_path(reservation);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(raw.lines().map(str::to_string).collect()),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    fn load_resource(&self, scope: &ResourceScope) -> Result<ResourceFile, ApiError> {
        let path = self.resource_path(scope);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                return Err(ApiError::UnknownResource {
                    reservation: scope.reservation_id.to_string(),
                    resource: scope.resource_name.clone(),
                })
            }
            Err(source) => return Err(io_error(&path, source)),
        };
        serde_json::from_str(&raw).map_err(|e| json_error(&path, e))
    }

    fn write_resource(&self, scope: &ResourceScope, file: &ResourceFile) -> Result<(), ApiError> {
        let path = self.resource_path(scope);
        let body = serde_json::to_vec_pretty(file).map_err(|e| json_error(&path, e))?;
        atomic_write_file(&path, &body).map_err(|e| io_error(&path, e))
    }

    fn load_secrets(&self) -> Result<BTreeMap<String, String>, ApiError> {
        let path = self.secrets_path();
        match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| json_error(&path, e)),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    fn acquire_lock(&self, reservation: &ReservationId) -> Result<LockGuard, ApiError> {
        let path = self.lock_path(reservation);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        for _ in 0..2 {
            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(std::process::id().to_string().as_bytes())
                        .map_err(|e| io_error(&path, e))?;
                    return Ok(LockGuard { path });
                }
                Err(source) if source.kind() == ErrorKind::AlreadyExists => {
                    let owner = fs::read_to_string(&path)
                        .ok()
                        .and_then(|raw| raw.trim().parse::<u32>().ok());
                    match owner {
                        Some(pid) if is_process_alive(pid) => {
                            return Err(ApiError::CustomDataLocked {
                                reservation: reservation.to_string(),
                                pid,
                            })
                        }
                        Some(_) => {
                            let _ = fs::remove_file(&path);
                        }
                        // The holder creates the file before writing its pid.
                        None if !lock_is_abandoned(&path) => {
                            return Err(ApiError::CustomDataLockPending {
                                reservation: reservation.to_string(),
                            })
                        }
                        None => {
                            let _ = fs::remove_file(&path);
                        }
                    }
                }
                Err(source) => return Err(io_error(&path, source)),
            }
        }
        Err(ApiError::CustomDataConflict {
            reservation: reservation.to_string(),
        })
    }
}

impl AttributeApi for FileSandboxApi {
    fn get_attributes(&self, scope: &ResourceScope) -> Result<Attributes, ApiError> {
        Ok(self.load_resource(scope)?.attributes)
    }

    fn set_attributes(
        &self,
        scope: &ResourceScope,
        requests: &[AttributeWriteRequest],
    ) -> Result<(), ApiError> {
        let mut file = self.load_resource(scope)?;
        for request in requests {
            file.attributes
                .insert(request.attribute_name.clone(), request.value.clone());
        }
        self.write_resource(scope, &file)
    }

    fn decrypt_password(&self, value: &str) -> Result<String, ApiError> {
        self.load_secrets()?
            .remove(value)
            .ok_or(ApiError::NotEncrypted)
    }
}

impl CustomDataApi for FileSandboxApi {
    fn get_custom_data(&self, reservation: &ReservationId) -> Result<Option<String>, ApiError> {
        let path = self.custom_data_path(reservation);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    fn set_custom_data(&self, reservation: &ReservationId, blob: &str) -> Result<(), ApiError> {
        let path = self.custom_data_path(reservation);
        atomic_write_file(&path, blob.as_bytes()).map_err(|e| io_error(&path, e))
    }

    fn compare_and_set_custom_data(
        &self,
        reservation: &ReservationId,
        expected: Option<&str>,
        blob: &str,
    ) -> Result<(), ApiError> {
        let _lock = self.acquire_lock(reservation)?;
        let current = self.get_custom_data(reservation)?;
        if current.as_deref() != expected {
            return Err(ApiError::CustomDataConflict {
                reservation: reservation.to_string(),
            });
        }
        self.set_custom_data(reservation, blob)
    }
}

impl OperatorChannel for FileSandboxApi {
    fn write_reservation_message(
        &self,
        reservation: &ReservationId,
        message: &str,
    ) -> Result<(), ApiError> {
        let path = self.output_log_path(reservation);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_error(&path, e))?;
        writeln!(file, "{}", message.replace('\n', " ")).map_err(|e| io_error(&path, e))
    }
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// A lock without a pid is abandoned once it is older than
/// [`LOCK_PID_GRACE`]; a missing or unreadable mtime counts as fresh.
fn lock_is_abandoned(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= LOCK_PID_GRACE)
}

fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        false
    }
}

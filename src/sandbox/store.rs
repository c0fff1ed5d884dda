use crate::api::{ApiError, CustomDataApi};
use crate::sandbox::record::ExecutionRecord;
use crate::shared::ReservationId;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("execution record for reservation `{reservation}` is stale: expected version {expected}, found {found}")]
    Conflict {
        reservation: String,
        expected: u64,
        found: u64,
    },
    #[error("execution record for reservation `{reservation}` is not valid json: {source}")]
    Decode {
        reservation: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode execution record for reservation `{reservation}`: {source}")]
    Encode {
        reservation: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Loads and saves the `ExecutionRecord` kept in a reservation's custom data.
pub struct SandboxStateStore<'a> {
    api: &'a dyn CustomDataApi,
}

impl<'a> SandboxStateStore<'a> {
    pub fn new(api: &'a dyn CustomDataApi) -> Self {
        Self { api }
    }

    /// Missing custom data is the zero-value record.
    pub fn load(&self, reservation: &ReservationId) -> Result<ExecutionRecord, StateError> {
        match self.api.get_custom_data(reservation)? {
            Some(blob) if !blob.trim().is_empty() => decode(reservation, &blob),
            _ => Ok(ExecutionRecord::default()),
        }
    }

    /// Overwrites the whole record.
    ///
    /// Succeeds only while the stored version still equals `record.version`;
    /// on success the record carries the new version and timestamp.
    pub fn save(
        &self,
        reservation: &ReservationId,
        record: &mut ExecutionRecord,
    ) -> Result<(), StateError> {
        let current = self.api.get_custom_data(reservation)?;
        let found = match current.as_deref() {
            Some(blob) if !blob.trim().is_empty() => decode(reservation, blob)?.version,
            _ => 0,
        };
        if found != record.version {
            return Err(StateError::Conflict {
                reservation: reservation.to_string(),
                expected: record.version,
                found,
            });
        }

        let mut next = record.clone();
        next.version = record.version.saturating_add(1);
        next.updated_at = Some(chrono::Utc::now().to_rfc3339());
        let blob = serde_json::to_string(&next).map_err(|source| StateError::Encode {
            reservation: reservation.to_string(),
            source,
        })?;

        match self
            .api
            .compare_and_set_custom_data(reservation, current.as_deref(), &blob)
        {
            Ok(()) => {
                *record = next;
                Ok(())
            }
            Err(ApiError::CustomDataConflict { .. }) => {
                let found = self.load(reservation)?.version;
                Err(StateError::Conflict {
                    reservation: reservation.to_string(),
                    expected: record.version,
                    found,
                })
            }
            Err(other) => Err(other.into()),
        }
    }
}

fn decode(reservation: &ReservationId, blob: &str) -> Result<ExecutionRecord, StateError> {
    serde_json::from_str(blob).map_err(|source| StateError::Decode {
        reservation: reservation.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ExecutionStatus;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryCustomData {
        blobs: RefCell<HashMap<String, String>>,
    }

    impl CustomDataApi for MemoryCustomData {
        fn get_custom_data(&self, reservation: &ReservationId) -> Result<Option<String>, ApiError> {
            Ok(self.blobs.borrow().get(reservation.as_str()).cloned())
        }

        fn set_custom_data(&self, reservation: &ReservationId, blob: &str) -> Result<(), ApiError> {
            self.blobs
                .borrow_mut()
                .insert(reservation.to_string(), blob.to_string());
            Ok(())
        }
    }

    fn reservation() -> ReservationId {
        ReservationId::parse("res-1").expect("id")
    }

    #[test]
    fn absent_data_loads_zero_record() {
        let api = MemoryCustomData::default();
        let store = SandboxStateStore::new(&api);
        assert_eq!(
            store.load(&reservation()).expect("load"),
            ExecutionRecord::default()
        );
    }

    #[test]
    fn save_bumps_version_and_round_trips() {
        let api = MemoryCustomData::default();
        let store = SandboxStateStore::new(&api);
        let mut record = store.load(&reservation()).expect("load");
        record.status = ExecutionStatus::Applied;
        record.run_id = Some("run-1".to_string());
        store.save(&reservation(), &mut record).expect("save");
        assert_eq!(record.version, 1);
        assert!(record.updated_at.is_some());

        let loaded = store.load(&reservation()).expect("reload");
        assert_eq!(loaded, record);
    }

    #[test]
    fn stale_save_is_rejected_without_overwriting() {
        let api = MemoryCustomData::default();
        let store = SandboxStateStore::new(&api);
        let mut first = store.load(&reservation()).expect("load first");
        let mut second = store.load(&reservation()).expect("load second");

        first.status = ExecutionStatus::ApplyFailed;
        store.save(&reservation(), &mut first).expect("first save");

        second.status = ExecutionStatus::Applied;
        let err = store
            .save(&reservation(), &mut second)
            .expect_err("stale save");
        match err {
            StateError::Conflict {
                expected, found, ..
            } => {
                assert_eq!(expected, 0);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            store.load(&reservation()).expect("load").status,
            ExecutionStatus::ApplyFailed
        );
    }

    #[test]
    fn malformed_blob_is_a_decode_error() {
        let api = MemoryCustomData::default();
        api.set_custom_data(&reservation(), "{not json")
            .expect("seed");
        let store = SandboxStateStore::new(&api);
        assert!(matches!(
            store.load(&reservation()),
            Err(StateError::Decode { .. })
        ));
    }
}

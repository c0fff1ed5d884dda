use crate::shared::{generate_run_id, now_secs, ReservationId};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("module source {path} is not a directory")]
    NotADirectory { path: String },
    #[error("terraform executable {path} does not exist")]
    MissingExecutable { path: String },
    #[error("failed to allocate working directory: {0}")]
    Allocate(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub reservation_id: ReservationId,
    pub source: PathBuf,
}

/// Materializes a Terraform module and executable for one reservation.
pub trait ModuleFetcher {
    /// Returns the working directory holding the module.
    fn fetch_module(&self, descriptor: &ModuleDescriptor) -> Result<PathBuf, FetchError>;

    fn fetch_executable(&self, working_dir: &Path) -> Result<(), FetchError>;
}

/// Copies a module from the local filesystem into
/// `<state_root>/workdirs/<reservation>/<id>`.
#[derive(Debug, Clone)]
pub struct LocalModuleFetcher {
    state_root: PathBuf,
    binary: String,
}

impl LocalModuleFetcher {
    pub fn new(state_root: impl Into<PathBuf>, binary: impl Into<String>) -> Self {
        Self {
            state_root: state_root.into(),
            binary: binary.into(),
        }
    }

    fn allocate_working_dir(&self, reservation: &ReservationId) -> Result<PathBuf, FetchError> {
        let parent = self.state_root.join("workdirs").join(reservation.as_str());
        fs::create_dir_all(&parent).map_err(|e| io_error(&parent, e))?;
        for _ in 0..16 {
            let id = generate_run_id(now_secs()).map_err(FetchError::Allocate)?;
            let candidate = parent.join(id.replacen("run-", "mod-", 1));
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(io_error(&candidate, e)),
            }
        }
        Err(FetchError::Allocate(format!(
            "no free working directory under {}",
            parent.display()
        )))
    }
}

impl ModuleFetcher for LocalModuleFetcher {
    fn fetch_module(&self, descriptor: &ModuleDescriptor) -> Result<PathBuf, FetchError> {
        if !descriptor.source.is_dir() {
            return Err(FetchError::NotADirectory {
                path: descriptor.source.display().to_string(),
            });
        }
        let working_dir = self.allocate_working_dir(&descriptor.reservation_id)?;
        copy_dir_recursive(&descriptor.source, &working_dir)?;
        Ok(working_dir)
    }

    /// Bare command names are left to `PATH` lookup at execution time.
    fn fetch_executable(&self, _working_dir: &Path) -> Result<(), FetchError> {
        let has_separator = self.binary.contains('/') || self.binary.contains('\\');
        if has_separator && !Path::new(&self.binary).is_file() {
            return Err(FetchError::MissingExecutable {
                path: self.binary.clone(),
            });
        }
        Ok(())
    }
}

fn copy_dir_recursive(source: &Path, target: &Path) -> Result<(), FetchError> {
    fs::create_dir_all(target).map_err(|e| io_error(target, e))?;
    let entries = fs::read_dir(source).map_err(|e| io_error(source, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_error(source, e))?;
        let path = entry.path();
        let destination = target.join(entry.file_name());
        if path.is_dir() {
            copy_dir_recursive(&path, &destination)?;
        } else {
            fs::copy(&path, &destination).map_err(|e| io_error(&path, e))?;
        }
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn module_is_copied_into_reservation_workdir() {
        let dir = tempdir().expect("tempdir");
        let module = dir.path().join("module");
        fs::create_dir_all(module.join("nested")).expect("mkdir");
        fs::write(module.join("main.tf"), "output \"x\" { value = 1 }").expect("write");
        fs::write(module.join("nested/vars.tf"), "").expect("write nested");

        let fetcher = LocalModuleFetcher::new(dir.path().join("state"), "terraform");
        let working_dir = fetcher
            .fetch_module(&ModuleDescriptor {
                reservation_id: ReservationId::parse("res-1").expect("id"),
                source: module,
            })
            .expect("fetch");
        assert!(working_dir.starts_with(dir.path().join("state/workdirs/res-1")));
        assert!(working_dir.join("main.tf").is_file());
        assert!(working_dir.join("nested/vars.tf").is_file());
    }

    #[test]
    fn missing_source_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let fetcher = LocalModuleFetcher::new(dir.path(), "terraform");
        let err = fetcher
            .fetch_module(&ModuleDescriptor {
                reservation_id: ReservationId::parse("res-1").expect("id"),
                source: dir.path().join("absent"),
            })
            .expect_err("missing module");
        assert!(matches!(err, FetchError::NotADirectory { .. }));
    }

    #[test]
    fn explicit_binary_path_must_exist() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("bin/terraform");
        let fetcher = LocalModuleFetcher::new(dir.path(), missing.display().to_string());
        assert!(matches!(
            fetcher.fetch_executable(dir.path()),
            Err(FetchError::MissingExecutable { .. })
        ));
        let on_path = LocalModuleFetcher::new(dir.path(), "terraform");
        assert!(on_path.fetch_executable(dir.path()).is_ok());
    }
}

use crate::{config::ResourceLimits, error::Error};
use nix::sys::resource::{setrlimit, Resource};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::{fs, process::Command};
use tracing::{debug, error};
use uuid::Uuid;

/// Throwaway jail directory from which sandboxed child processes are started.
///
/// The directory and everything written into it is removed when the sandbox
/// is dropped.
pub struct Sandbox {
    /// Unique ID for this sandbox instance
    id: String,
    root: Option<TempDir>,
    limits: ResourceLimits,
}

impl Sandbox {
    /// Create a new sandbox below `parent`, or below the system temp dir
    pub async fn new(parent: Option<&Path>, limits: ResourceLimits) -> Result<Self, Error> {
        let id = Uuid::new_v4().to_string();
        let prefix = format!("sandbox-{}-", &id[..8]);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let root = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| Error::Sandbox(format!("Failed to create sandbox directory: {}", e)))?;

        fs::create_dir_all(root.path().join("home"))
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to create home directory: {}", e)))?;

        debug!(sandbox_id = %id, root = %root.path().display(), "sandbox created");
        Ok(Self {
            id,
            root: Some(root),
            limits,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root_dir(&self) -> PathBuf {
        self.root
            .as_ref()
            .map(|root| root.path().to_path_buf())
            .unwrap_or_default()
    }

    /// Write a support file (runner scripts and the like) into the jail
    pub async fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf, Error> {
        let path = self.root_dir().join(name);
        fs::write(&path, contents)
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to write {}: {}", name, e)))?;
        Ok(path)
    }

    /// Build a command that runs inside the jail with a scrubbed environment,
    /// piped standard streams and the configured rlimits.
    ///
    /// The child is killed when the returned handle is dropped.
    pub fn command(&self, program: &Path) -> Command {
        let root = self.root_dir();
        let mut command = Command::new(program);
        command
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .env("HOME", root.join("home"))
            .env("LANG", "C.UTF-8")
            .current_dir(&root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let limits = self.limits.clone();
        unsafe {
            command.pre_exec(move || apply_limits(&limits));
        }

        command
    }

    /// Remove the jail now instead of at drop time
    pub fn destroy(&mut self) {
        if let Some(root) = self.root.take() {
            let path = root.path().to_path_buf();
            if let Err(e) = root.close() {
                error!(sandbox_id = %self.id, "Failed to clean up sandbox directory {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Runs in the forked child between fork and exec
fn apply_limits(limits: &ResourceLimits) -> std::io::Result<()> {
    setrlimit(Resource::RLIMIT_FSIZE, limits.file_size, limits.file_size)?;
    setrlimit(Resource::RLIMIT_NOFILE, limits.open_files, limits.open_files)?;

    if let Some(cpu_time) = limits.cpu_time {
        setrlimit(Resource::RLIMIT_CPU, cpu_time as u64, cpu_time as u64)?;
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(memory) = limits.memory {
            setrlimit(Resource::RLIMIT_AS, memory, memory)?;
        }
    }

    Ok(())
}

/// Locate an executable on the host `PATH`
pub fn resolve_program(name: &str) -> Result<PathBuf, Error> {
    which::which(name).map_err(|_| Error::Sandbox(format!("Command not found: {}", name)))
}

use crate::error::ProbeError;
use log::debug;
use std::env;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

pub const MTR_BINARY: &str = "mtr";

/// Parameters of one probe invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub target: String,
    pub cycles: u32,
    pub extra_flags: Vec<String>,
}

impl ProbeRequest {
    /// Arguments for a non-interactive `mtr` report run.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--report".to_string(),
            "-c".to_string(),
            self.cycles.to_string(),
            self.target.clone(),
        ];
        args.extend(self.extra_flags.iter().cloned());
        args
    }
}

pub trait Probe {
    fn run(&self, request: &ProbeRequest) -> impl Future<Output = Result<String, ProbeError>> + Send;
}

/// Invokes the `mtr` executable found in an explicit list of directories.
pub struct MtrProbe {
    binary: String,
    search_dirs: Vec<PathBuf>,
}

impl MtrProbe {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            binary: MTR_BINARY.to_string(),
            search_dirs,
        }
    }

    /// Search the directories listed in `PATH`.
    pub fn from_env() -> Self {
        let dirs = env::var_os("PATH")
            .map(|path| env::split_paths(&path).collect())
            .unwrap_or_default();
        Self::new(dirs)
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn locate(&self) -> Result<PathBuf, ProbeError> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&self.binary))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(|| ProbeError::NotFound {
                name: self.binary.clone(),
                searched: self.search_dirs.clone(),
            })
    }
}

impl Probe for MtrProbe {
    async fn run(&self, request: &ProbeRequest) -> Result<String, ProbeError> {
        let path = self.locate()?;
        let args = request.args();
        debug!("Running {} {}", path.display(), args.join(" "));

        let output = Command::new(&path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                path: path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProbeError::ExecutionFailed {
                path,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

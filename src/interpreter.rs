//! INSTEAD interpreter detection and verification
//!
//! Finding a candidate only proves a file exists; `check` is what proves the
//! file is a working interpreter, by running it with `-version`.

use std::env;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::logging::log_info;

/// Well-known installation paths, probed in order
#[cfg(all(unix, not(target_os = "macos")))]
const CANDIDATE_PATHS: &[&str] = &[
    "/usr/local/bin/sdl-instead",
    "/usr/bin/sdl-instead",
    "/usr/local/bin/instead",
    "/usr/bin/instead",
];

#[cfg(target_os = "macos")]
const CANDIDATE_PATHS: &[&str] = &[
    "/Applications/Instead.app/Contents/MacOS/sdl-instead",
    "/usr/local/bin/sdl-instead",
];

#[cfg(target_os = "windows")]
const CANDIDATE_PATHS: &[&str] = &[
    "C:\\Program Files\\INSTEAD\\sdl-instead.exe",
    "C:\\Program Files (x86)\\INSTEAD\\sdl-instead.exe",
];

/// Binary names resolved through PATH after the fixed candidates
const PATH_BINARY_NAMES: &[&str] = &["sdl-instead", "instead"];

/// Bundled interpreter location relative to the application's own directory
#[cfg(all(unix, not(target_os = "macos")))]
const BUILTIN_RELATIVE_PATH: &str = "instead/sdl-instead";

#[cfg(target_os = "macos")]
const BUILTIN_RELATIVE_PATH: &str = "Instead.app/Contents/MacOS/sdl-instead";

#[cfg(target_os = "windows")]
const BUILTIN_RELATIVE_PATH: &str = "instead\\sdl-instead.exe";

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Types
// ============================================================================

/// Result of locating (and optionally verifying) an interpreter
#[derive(Debug, Clone)]
pub struct InterpreterCandidate {
    pub command_path: String,
    pub verified_version: Option<String>,
}

/// Why an interpreter check failed. `builtin` tells the caller whether the
/// checked command was the bundled interpreter (a packaging defect) or an
/// externally configured one (a configuration defect).
#[derive(Debug)]
pub enum CheckError {
    Spawn {
        command: String,
        builtin: bool,
        reason: String,
    },
    Failed {
        command: String,
        builtin: bool,
        status: Option<i32>,
    },
    Timeout {
        command: String,
        builtin: bool,
    },
}

impl CheckError {
    /// Whether the failing command was the bundled interpreter
    pub fn is_builtin(&self) -> bool {
        match self {
            CheckError::Spawn { builtin, .. }
            | CheckError::Failed { builtin, .. }
            | CheckError::Timeout { builtin, .. } => *builtin,
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckError::Spawn { command, reason, .. } => {
                write!(f, "could not run '{}': {}", command, reason)
            }
            CheckError::Failed { command, status, .. } => match status {
                Some(code) => write!(f, "'{}' exited with status {}", command, code),
                None => write!(f, "'{}' was terminated by a signal", command),
            },
            CheckError::Timeout { command, .. } => {
                write!(f, "'{}' did not answer the version probe in time", command)
            }
        }
    }
}

impl std::error::Error for CheckError {}

// ============================================================================
// Finder
// ============================================================================

pub struct InterpreterFinder {
    current_dir: PathBuf,
}

impl Default for InterpreterFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpreterFinder {
    /// Finder anchored at the running executable's directory
    #[must_use]
    pub fn new() -> Self {
        let current_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self { current_dir }
    }

    /// Finder anchored at an explicit directory
    #[must_use]
    pub fn with_dir(current_dir: PathBuf) -> Self {
        Self { current_dir }
    }

    /// Whether a bundled interpreter ships alongside the application
    pub fn has_builtin(&self) -> bool {
        self.builtin_path().is_file()
    }

    /// Path of the bundled interpreter, if present
    pub fn find_builtin(&self) -> Option<String> {
        self.has_builtin()
            .then(|| self.builtin_path().to_string_lossy().into_owned())
    }

    fn builtin_path(&self) -> PathBuf {
        self.current_dir.join(BUILTIN_RELATIVE_PATH)
    }

    /// First existing candidate path, or the first matching binary on PATH.
    /// Existence only; `check` decides whether the file actually works.
    /// Returning `None` is a legitimate "nothing detected" outcome.
    pub fn find(&self) -> Option<String> {
        let fixed: Vec<PathBuf> = CANDIDATE_PATHS.iter().map(PathBuf::from).collect();
        if let Some(path) = first_existing(&fixed) {
            return Some(path.to_string_lossy().into_owned());
        }

        let path_var = env::var_os("PATH")?;
        let from_path: Vec<PathBuf> = env::split_paths(&path_var)
            .flat_map(|dir| {
                PATH_BINARY_NAMES
                    .iter()
                    .map(move |name| dir.join(format!("{}{}", name, env::consts::EXE_SUFFIX)))
            })
            .collect();
        first_existing(&from_path).map(|path| path.to_string_lossy().into_owned())
    }

    /// Run the candidate with `-version` and return its trimmed output.
    ///
    /// Any spawn failure, timeout or non-zero exit is an error with no
    /// version string.
    pub fn check(&self, command: &str) -> Result<String, CheckError> {
        let builtin = self.find_builtin().as_deref() == Some(command);

        let mut child = Command::new(command)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CheckError::Spawn {
                command: command.to_string(),
                builtin,
                reason: e.to_string(),
            })?;

        let status = match child.wait_timeout(CHECK_TIMEOUT) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CheckError::Timeout {
                    command: command.to_string(),
                    builtin,
                });
            }
            Err(e) => {
                return Err(CheckError::Spawn {
                    command: command.to_string(),
                    builtin,
                    reason: e.to_string(),
                });
            }
        };

        if !status.success() {
            return Err(CheckError::Failed {
                command: command.to_string(),
                builtin,
                status: status.code(),
            });
        }

        let mut out = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            let _ = stdout.read_to_string(&mut out);
        }

        Ok(out.replace(['\n', '\r'], ""))
    }

    /// Detect an interpreter and verify it in one step
    pub fn locate_verified(&self) -> Option<InterpreterCandidate> {
        let command_path = self.find()?;
        let verified_version = match self.check(&command_path) {
            Ok(version) => {
                log_info(&format!(
                    "Interpreter {} reports version {}",
                    command_path, version
                ));
                Some(version)
            }
            Err(_) => None,
        };
        Some(InterpreterCandidate {
            command_path,
            verified_version,
        })
    }
}

fn first_existing(paths: &[PathBuf]) -> Option<&PathBuf> {
    paths.iter().find(|path| path.exists())
}

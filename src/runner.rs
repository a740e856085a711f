//! Launching installed games through the interpreter

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::catalog::Game;
use crate::logging::log_info;

#[derive(Debug)]
pub enum RunError {
    /// The game has no install directory to launch
    NotInstalled { name: String },
    /// No interpreter command is configured or detectable
    NoInterpreter,
    /// The interpreter process could not be started
    Spawn { command: String, reason: String },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::NotInstalled { name } => write!(f, "game '{}' is not installed", name),
            RunError::NoInterpreter => write!(f, "no interpreter configured or detected"),
            RunError::Spawn { command, reason } => {
                write!(f, "could not start interpreter '{}': {}", command, reason)
            }
        }
    }
}

impl std::error::Error for RunError {}

/// Spawns the interpreter against installed games.
pub struct Runner {
    interpreter_command: String,
    games_root: PathBuf,
}

impl Runner {
    #[must_use]
    pub fn new(interpreter_command: String, games_root: PathBuf) -> Self {
        Self {
            interpreter_command,
            games_root,
        }
    }

    /// Launch the game's install directory through the interpreter.
    ///
    /// Fire-and-forget: the child is not waited on, so only spawn failures
    /// are observable here. How the game itself fares is its own business.
    pub fn run(&self, game: &Game) -> Result<(), RunError> {
        if !game.installed {
            return Err(RunError::NotInstalled {
                name: game.name.clone(),
            });
        }
        if self.interpreter_command.is_empty() {
            return Err(RunError::NoInterpreter);
        }

        let game_dir = game.install_dir(&self.games_root);
        Command::new(&self.interpreter_command)
            .arg(&game_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RunError::Spawn {
                command: self.interpreter_command.clone(),
                reason: e.to_string(),
            })?;

        log_info(&format!(
            "Launched '{}' with {} {}",
            game.name,
            self.interpreter_command,
            game_dir.display()
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(name: &str, installed: bool) -> Game {
        Game {
            name: name.to_string(),
            title: name.to_string(),
            description: String::new(),
            version: String::new(),
            languages: Vec::new(),
            repository_name: "official".to_string(),
            description_url: String::new(),
            download_url: String::new(),
            image_url: None,
            size_bytes: 0,
            published_at: None,
            installed,
        }
    }

    #[test]
    fn test_run_rejects_uninstalled_game() {
        let runner = Runner::new("/bin/true".to_string(), PathBuf::from("/tmp"));
        let err = runner.run(&game("galaxy", false)).unwrap_err();
        assert!(matches!(err, RunError::NotInstalled { .. }));
    }

    #[test]
    fn test_run_requires_interpreter_command() {
        let runner = Runner::new(String::new(), PathBuf::from("/tmp"));
        let err = runner.run(&game("galaxy", true)).unwrap_err();
        assert!(matches!(err, RunError::NoInterpreter));
    }

    #[test]
    fn test_run_missing_executable_is_spawn_error() {
        let runner = Runner::new(
            "/bin/instman-test-nonexistent".to_string(),
            PathBuf::from("/tmp"),
        );
        let err = runner.run(&game("galaxy", true)).unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_spawns_detached() {
        let runner = Runner::new("/bin/true".to_string(), PathBuf::from("/tmp"));
        // Spawn succeeds; the child's own exit status is not our concern
        runner.run(&game("galaxy", true)).unwrap();
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::instman_path;
use crate::repository::Repository;

// ============================================================================
// Main App Config
// ============================================================================

#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub repositories: Vec<Repository>,
    pub interpreter_command: String,
    pub use_builtin_interpreter: bool,
    pub lang: String,
    /// Override for the managed games root; defaults to `<data>/games`
    pub games_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            repositories: default_repositories(),
            interpreter_command: String::new(),
            use_builtin_interpreter: true,
            lang: String::new(),
            games_path: None,
        }
    }
}

fn default_repositories() -> Vec<Repository> {
    vec![
        Repository {
            name: "official".to_string(),
            url: "http://instead-games.ru/xml.php".to_string(),
        },
        Repository {
            name: "sandbox".to_string(),
            url: "http://instead-games-sandbox.ru/xml.php".to_string(),
        },
    ]
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        instman_path!("config.json")
    }

    pub fn load() -> Self {
        let path = Self::config_path();
        if path.exists() {
            if let Ok(content) = fs::read_to_string(&path) {
                if let Ok(config) = serde_json::from_str(&content) {
                    return config;
                }
            }
        }
        Self::default()
    }

    pub fn save(&self) {
        let path = Self::config_path();
        // Ensure parent dir exists
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(self) {
            let _ = fs::write(path, json);
        }
    }

    /// Root directory holding one subdirectory per installed game
    pub fn games_path(&self) -> PathBuf {
        self.games_path
            .clone()
            .unwrap_or_else(|| instman_path!("games"))
    }

    /// Directory with the cached repository index documents
    pub fn repositories_cache_path(&self) -> PathBuf {
        instman_path!("repositories")
    }

    /// Directory with cached game icons
    pub fn images_path(&self) -> PathBuf {
        instman_path!("images")
    }

    /// Staging directory for in-flight downloads
    pub fn tmp_path(&self) -> PathBuf {
        instman_path!("tmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_repositories() {
        let config = AppConfig::default();
        assert_eq!(config.repositories.len(), 2);
        assert_eq!(config.repositories[0].name, "official");
        assert!(config.use_builtin_interpreter);
        assert!(config.interpreter_command.is_empty());
    }

    #[test]
    fn test_config_json_round_trip() {
        let mut config = AppConfig::default();
        config.interpreter_command = "/usr/bin/sdl-instead".to_string();
        config.lang = "en".to_string();

        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.interpreter_command, "/usr/bin/sdl-instead");
        assert_eq!(parsed.lang, "en");
        assert_eq!(parsed.repositories, config.repositories);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let parsed: AppConfig = serde_json::from_str(r#"{"lang": "ru"}"#).unwrap();
        assert_eq!(parsed.lang, "ru");
        assert_eq!(parsed.repositories.len(), 2);
        assert!(parsed.use_builtin_interpreter);
    }
}

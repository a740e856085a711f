//! Merged game catalog with query operations
//!
//! The catalog is rebuilt wholesale on every successful sync and published
//! as an immutable snapshot; queries never mutate it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use parking_lot::RwLock;

use crate::utils;

// ============================================================================
// Types
// ============================================================================

/// One game record merged from a repository index
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    /// Stable machine id, unique within its repository
    pub name: String,
    pub title: String,
    pub description: String,
    pub version: String,
    pub languages: Vec<String>,
    pub repository_name: String,
    pub description_url: String,
    pub download_url: String,
    pub image_url: Option<String>,
    pub size_bytes: u64,
    pub published_at: Option<NaiveDateTime>,
    /// Derived from the filesystem, never authoritative on its own
    pub installed: bool,
}

impl Game {
    /// Directory this game occupies (or would occupy) under the games root
    pub fn install_dir(&self, games_root: &Path) -> PathBuf {
        games_root.join(&self.name)
    }

    /// Recheck the filesystem for this game's install directory
    pub fn is_installed_at(&self, games_root: &Path) -> bool {
        self.install_dir(games_root).is_dir()
    }

    pub fn human_size(&self) -> String {
        utils::human_size(self.size_bytes)
    }

    pub fn human_version(&self) -> &str {
        if self.version.is_empty() {
            "-"
        } else {
            &self.version
        }
    }
}

/// The merged set of games from all repositories at the last sync
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    games: Vec<Game>,
}

impl Catalog {
    #[must_use]
    pub fn new(games: Vec<Game>) -> Self {
        Self { games }
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Games ordered newest first; undated games last, ties broken by
    /// case-insensitive title
    pub fn sorted_by_date_desc(&self) -> Vec<Game> {
        let mut games = self.games.clone();
        games.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        });
        games
    }

    /// Games ordered by case-insensitive title
    pub fn sorted_by_title(&self) -> Vec<Game> {
        let mut games = self.games.clone();
        games.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
        games
    }

    /// Recompute every game's installed flag from the filesystem
    pub fn refresh_installed(&mut self, games_root: &Path) {
        for game in &mut self.games {
            game.installed = game.is_installed_at(games_root);
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Filter games by keyword (name OR title, case-insensitive substring),
/// repository, language and install state. Predicates compose with AND and
/// the input order is preserved.
pub fn filter_games(
    games: &[Game],
    keyword: Option<&str>,
    repository: Option<&str>,
    lang: Option<&str>,
    only_installed: bool,
) -> Vec<Game> {
    games
        .iter()
        .filter(|game| {
            if let Some(keyword) = keyword {
                let keyword = keyword.to_lowercase();
                if !game.name.to_lowercase().contains(&keyword)
                    && !game.title.to_lowercase().contains(&keyword)
                {
                    return false;
                }
            }
            if let Some(repository) = repository {
                if !game.repository_name.eq_ignore_ascii_case(repository) {
                    return false;
                }
            }
            if let Some(lang) = lang {
                if !game.languages.iter().any(|l| l.eq_ignore_ascii_case(lang)) {
                    return false;
                }
            }
            if only_installed && !game.installed {
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

/// Sorted set of distinct languages across the given games. Deduplication is
/// case-insensitive; the first casing seen is kept.
pub fn find_languages(games: &[Game]) -> Vec<String> {
    let mut langs: Vec<String> = Vec::new();
    for game in games {
        for lang in &game.languages {
            if !langs.iter().any(|l| l.eq_ignore_ascii_case(lang)) {
                langs.push(lang.clone());
            }
        }
    }
    langs.sort_by_key(|l| l.to_lowercase());
    langs
}

/// Pick a game from keyword-filtered candidates: an exact case-insensitive
/// name match wins, otherwise the first candidate is returned. `None` only
/// when `candidates` is empty.
pub fn resolve_by_keyword<'a>(candidates: &'a [Game], keyword: &str) -> Option<&'a Game> {
    if candidates.is_empty() {
        return None;
    }

    candidates
        .iter()
        .find(|game| game.name.eq_ignore_ascii_case(keyword))
        .or_else(|| candidates.first())
}

// ============================================================================
// Snapshot Store
// ============================================================================

/// Holder for the last-published catalog snapshot.
///
/// `publish` swaps the snapshot atomically; readers keep the `Arc` they got
/// from `snapshot` and are never exposed to a half-merged catalog.
pub struct CatalogStore {
    inner: RwLock<Arc<Catalog>>,
}

impl CatalogStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(Catalog::default())),
        }
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        self.inner.read().clone()
    }

    pub fn publish(&self, catalog: Catalog) {
        *self.inner.write() = Arc::new(catalog);
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

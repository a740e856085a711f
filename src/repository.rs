//! Remote repository index fetching, parsing and caching
//!
//! Each configured repository serves an XML game-list document. Repositories
//! sync independently: one failing never blocks the others, and the merged
//! catalog is assembled only after every repository has been attempted.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Game};
use crate::logging::{log_error, log_sync, log_warning};
use crate::utils;

// ============================================================================
// Types
// ============================================================================

/// A configured source of games; identity is `name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub url: String,
}

/// Why one repository failed to sync
#[derive(Debug)]
pub enum SyncFailure {
    Network(String),
    Status(u16),
    Parse(String),
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncFailure::Network(reason) => write!(f, "network error: {}", reason),
            SyncFailure::Status(code) => write!(f, "server returned status {}", code),
            SyncFailure::Parse(reason) => write!(f, "malformed index document: {}", reason),
        }
    }
}

/// A per-repository sync failure; the repository's games are absent from the
/// catalog returned alongside it
#[derive(Debug)]
pub struct SyncError {
    pub repository: String,
    pub cause: SyncFailure,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "repository '{}': {}", self.repository, self.cause)
    }
}

impl std::error::Error for SyncError {}

// ============================================================================
// Index Document Parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct GameList {
    #[serde(rename = "game", default)]
    games: Vec<IndexRecord>,
}

/// Raw record as it appears in the index document. Everything is optional at
/// this layer; validation decides what survives.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IndexRecord {
    name: Option<String>,
    title: Option<String>,
    version: Option<String>,
    lang: Option<String>,
    url: Option<String>,
    size: Option<String>,
    descurl: Option<String>,
    description: Option<String>,
    date: Option<String>,
    image: Option<String>,
}

/// Parse an index document into game records tagged with `repository`.
///
/// Records missing `name`, `url` or a parsable `size` are dropped
/// individually; optional fields default to empty.
pub fn parse_index(xml: &str, repository: &str) -> Result<Vec<Game>, quick_xml::DeError> {
    let list: GameList = quick_xml::de::from_str(xml)?;

    let total = list.games.len();
    let games: Vec<Game> = list
        .games
        .into_iter()
        .filter_map(|record| record_into_game(record, repository))
        .collect();

    let dropped = total - games.len();
    if dropped > 0 {
        log_warning(&format!(
            "Repository '{}': dropped {} record(s) missing mandatory fields",
            repository, dropped
        ));
    }

    Ok(games)
}

fn record_into_game(record: IndexRecord, repository: &str) -> Option<Game> {
    let name = record.name.filter(|s| !s.trim().is_empty())?;
    let download_url = record.url.filter(|s| !s.trim().is_empty())?;
    let size_bytes = record.size.as_deref()?.trim().parse::<u64>().ok()?;

    let title = record
        .title
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| name.clone());

    Some(Game {
        title,
        description: record.description.unwrap_or_default(),
        version: record.version.unwrap_or_default(),
        languages: record.lang.as_deref().map(split_languages).unwrap_or_default(),
        repository_name: repository.to_string(),
        description_url: record.descurl.unwrap_or_default(),
        download_url,
        image_url: record.image.filter(|s| !s.trim().is_empty()),
        size_bytes,
        published_at: record.date.as_deref().and_then(parse_index_date),
        installed: false,
        name,
    })
}

fn split_languages(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_index_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Fetches repository indexes and keeps the on-disk index cache.
pub struct Synchronizer {
    agent: ureq::Agent,
    cache_dir: PathBuf,
}

impl Synchronizer {
    #[must_use]
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            agent: utils::http_agent(),
            cache_dir,
        }
    }

    /// Fetch and parse every repository, independently.
    ///
    /// The returned catalog contains exactly the games of the repositories
    /// that succeeded; each failing repository contributes one `SyncError`.
    /// Nothing is published until all repositories have been attempted.
    pub fn sync_all(&self, repositories: &[Repository]) -> (Catalog, Vec<SyncError>) {
        let mut games = Vec::new();
        let mut errors = Vec::new();

        for repository in repositories {
            match self.sync_one(repository) {
                Ok(mut parsed) => {
                    log_sync(&format!(
                        "Repository '{}': {} game(s)",
                        repository.name,
                        parsed.len()
                    ));
                    games.append(&mut parsed);
                }
                Err(cause) => {
                    log_error(&format!("Repository '{}' failed: {}", repository.name, cause));
                    errors.push(SyncError {
                        repository: repository.name.clone(),
                        cause,
                    });
                }
            }
        }

        (Catalog::new(games), errors)
    }

    fn sync_one(&self, repository: &Repository) -> Result<Vec<Game>, SyncFailure> {
        log_sync(&format!(
            "Fetching index for '{}' from {}",
            repository.name, repository.url
        ));

        let body = match self
            .agent
            .get(&repository.url)
            .set("User-Agent", utils::USER_AGENT)
            .call()
        {
            Ok(response) => response
                .into_string()
                .map_err(|e| SyncFailure::Network(e.to_string()))?,
            Err(ureq::Error::Status(code, _)) => return Err(SyncFailure::Status(code)),
            Err(e) => return Err(SyncFailure::Network(e.to_string())),
        };

        let games =
            parse_index(&body, &repository.name).map_err(|e| SyncFailure::Parse(e.to_string()))?;

        // Cache the raw document so listing works offline; a failed write is
        // not a sync failure, the in-memory catalog is already complete.
        if let Err(e) = self.write_cache(&repository.name, &body) {
            log_warning(&format!(
                "Could not cache index for '{}': {}",
                repository.name, e
            ));
        }

        Ok(games)
    }

    /// Whether at least one repository index has ever been cached. Callers
    /// use this to decide if an initial sync is mandatory before listing.
    pub fn has_any_synced_data(&self) -> bool {
        fs::read_dir(&self.cache_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .any(|e| e.path().extension().is_some_and(|ext| ext == "xml"))
            })
            .unwrap_or(false)
    }

    /// Rebuild a catalog from the cached index documents without touching
    /// the network. Repositories with no (or unreadable) cache are skipped.
    pub fn load_cached(&self, repositories: &[Repository]) -> Catalog {
        let mut games = Vec::new();

        for repository in repositories {
            let path = self.cache_file(&repository.name);
            let Ok(body) = fs::read_to_string(&path) else {
                continue;
            };
            match parse_index(&body, &repository.name) {
                Ok(mut parsed) => games.append(&mut parsed),
                Err(e) => log_warning(&format!(
                    "Cached index for '{}' is unreadable: {}",
                    repository.name, e
                )),
            }
        }

        Catalog::new(games)
    }

    fn cache_file(&self, repository_name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.xml", repository_name))
    }

    fn write_cache(&self, repository_name: &str, body: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        fs::write(self.cache_file(repository_name), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_INDEX: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<game_list>
    <game>
        <name>galaxy</name>
        <title>Galaxy Quest</title>
        <version>1.2</version>
        <lang>en,ru</lang>
        <url>http://example.com/games/galaxy.zip</url>
        <size>1000</size>
        <descurl>http://example.com/games/galaxy</descurl>
        <description>A space adventure.</description>
        <date>2020-05-05 12:30:00</date>
        <image>http://example.com/games/galaxy.png</image>
    </game>
    <game>
        <name>cat</name>
        <url>http://example.com/games/cat.zip</url>
        <size>2048</size>
        <date>2019-01-01</date>
    </game>
    <game>
        <title>No name, gets dropped</title>
        <url>http://example.com/games/orphan.zip</url>
        <size>10</size>
    </game>
    <game>
        <name>badsize</name>
        <url>http://example.com/games/badsize.zip</url>
        <size>lots</size>
    </game>
</game_list>
"#;

    #[test]
    fn test_parse_index_full_record() {
        let games = parse_index(SAMPLE_INDEX, "official").unwrap();
        let galaxy = &games[0];

        assert_eq!(galaxy.name, "galaxy");
        assert_eq!(galaxy.title, "Galaxy Quest");
        assert_eq!(galaxy.version, "1.2");
        assert_eq!(galaxy.languages, vec!["en", "ru"]);
        assert_eq!(galaxy.repository_name, "official");
        assert_eq!(galaxy.download_url, "http://example.com/games/galaxy.zip");
        assert_eq!(galaxy.size_bytes, 1000);
        assert_eq!(galaxy.image_url.as_deref(), Some("http://example.com/games/galaxy.png"));
        assert_eq!(
            galaxy.published_at.unwrap().format("%Y-%m-%d %H:%M:%S").to_string(),
            "2020-05-05 12:30:00"
        );
        assert!(!galaxy.installed);
    }

    #[test]
    fn test_parse_index_optional_fields_default() {
        let games = parse_index(SAMPLE_INDEX, "official").unwrap();
        let cat = &games[1];

        // Missing title falls back to the machine name
        assert_eq!(cat.title, "cat");
        assert!(cat.description.is_empty());
        assert!(cat.languages.is_empty());
        assert!(cat.image_url.is_none());
        // Date-only form parses to midnight
        assert_eq!(
            cat.published_at.unwrap().format("%Y-%m-%d %H:%M:%S").to_string(),
            "2019-01-01 00:00:00"
        );
    }

    #[test]
    fn test_parse_index_drops_invalid_records_only() {
        let games = parse_index(SAMPLE_INDEX, "official").unwrap();
        // The no-name and unparsable-size records are gone, the rest stay
        assert_eq!(games.len(), 2);
        assert!(games.iter().all(|g| g.name == "galaxy" || g.name == "cat"));
    }

    #[test]
    fn test_parse_index_rejects_malformed_document() {
        assert!(parse_index("not xml at all <game_list", "official").is_err());
    }

    #[test]
    fn test_parse_index_empty_list() {
        let games = parse_index("<game_list></game_list>", "official").unwrap();
        assert!(games.is_empty());
    }

    #[test]
    fn test_split_languages() {
        assert_eq!(split_languages("en, ru ,uk"), vec!["en", "ru", "uk"]);
        assert_eq!(split_languages(""), Vec::<String>::new());
    }

    #[test]
    fn test_cache_round_trip_and_staleness_flag() {
        let dir = tempfile::tempdir().unwrap();
        let sync = Synchronizer::new(dir.path().to_path_buf());
        let repos = vec![Repository {
            name: "official".to_string(),
            url: "http://example.invalid/xml.php".to_string(),
        }];

        assert!(!sync.has_any_synced_data());
        assert!(sync.load_cached(&repos).is_empty());

        sync.write_cache("official", SAMPLE_INDEX).unwrap();
        assert!(sync.has_any_synced_data());

        let catalog = sync.load_cached(&repos);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.games().iter().all(|g| g.repository_name == "official"));
    }

    #[test]
    fn test_load_cached_skips_unreadable_repository() {
        let dir = tempfile::tempdir().unwrap();
        let sync = Synchronizer::new(dir.path().to_path_buf());
        let repos = vec![
            Repository {
                name: "good".to_string(),
                url: "http://example.invalid/good.php".to_string(),
            },
            Repository {
                name: "broken".to_string(),
                url: "http://example.invalid/broken.php".to_string(),
            },
        ];

        sync.write_cache("good", SAMPLE_INDEX).unwrap();
        sync.write_cache("broken", "<game_list><gam").unwrap();

        // One repository's bad data never poisons the others
        let catalog = sync.load_cached(&repos);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.games().iter().all(|g| g.repository_name == "good"));
    }

    #[test]
    fn test_sync_all_records_error_per_failing_repository() {
        let dir = tempfile::tempdir().unwrap();
        let sync = Synchronizer::new(dir.path().to_path_buf());

        // Unresolvable hosts: every repository fails, none blocks the others
        let repos = vec![
            Repository {
                name: "one".to_string(),
                url: "http://instman-test-one.invalid/xml.php".to_string(),
            },
            Repository {
                name: "two".to_string(),
                url: "http://instman-test-two.invalid/xml.php".to_string(),
            },
        ];

        let (catalog, errors) = sync.sync_all(&repos);
        assert!(catalog.is_empty());
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].repository, "one");
        assert_eq!(errors[1].repository, "two");
        assert!(matches!(errors[0].cause, SyncFailure::Network(_)));
    }
}

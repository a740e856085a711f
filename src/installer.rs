//! Game package download, extraction and removal

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::catalog::Game;
use crate::logging::{log_download, log_install, log_warning};
use crate::utils;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum InstallError {
    /// Download failed or was interrupted
    Network { url: String, reason: String },
    /// Local filesystem operation failed
    Filesystem { path: String, reason: String },
    /// The downloaded package could not be unpacked
    Archive { path: String, reason: String },
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallError::Network { url, reason } => {
                write!(f, "download of '{}' failed: {}", url, reason)
            }
            InstallError::Filesystem { path, reason } => {
                write!(f, "filesystem error at '{}': {}", path, reason)
            }
            InstallError::Archive { path, reason } => {
                write!(f, "could not unpack '{}': {}", path, reason)
            }
        }
    }
}

impl std::error::Error for InstallError {}

fn fs_error(path: &Path, e: io::Error) -> InstallError {
    InstallError::Filesystem {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

// ============================================================================
// Installer
// ============================================================================

/// Installs game packages under the games root and removes them again.
pub struct Installer {
    agent: ureq::Agent,
    games_root: PathBuf,
    tmp_dir: PathBuf,
    images_dir: PathBuf,
}

enum ArchiveKind {
    Zip,
    TarGz,
}

impl Installer {
    #[must_use]
    pub fn new(games_root: PathBuf, tmp_dir: PathBuf, images_dir: PathBuf) -> Self {
        Self {
            agent: utils::http_agent(),
            games_root,
            tmp_dir,
            images_dir,
        }
    }

    /// Download and unpack a game package.
    ///
    /// `on_progress` receives cumulative bytes transferred, at least once per
    /// buffered chunk, strictly increasing, ending at the package size on
    /// success. On any failure partial output is deleted and the game stays
    /// uninstalled.
    pub fn install<F>(&self, game: &mut Game, mut on_progress: F) -> Result<(), InstallError>
    where
        F: FnMut(u64),
    {
        log_install(&format!(
            "Installing '{}' from {}",
            game.name, game.download_url
        ));

        fs::create_dir_all(&self.tmp_dir).map_err(|e| fs_error(&self.tmp_dir, e))?;
        let archive_path = self.tmp_dir.join(archive_file_name(game));

        if let Err(e) = self.download(&game.download_url, &archive_path, &mut on_progress) {
            let _ = fs::remove_file(&archive_path);
            return Err(e);
        }

        let target = game.install_dir(&self.games_root);
        if let Err(e) = extract_archive(&archive_path, &target, archive_kind(&game.download_url)) {
            let _ = fs::remove_dir_all(&target);
            let _ = fs::remove_file(&archive_path);
            return Err(e);
        }
        let _ = fs::remove_file(&archive_path);

        // Best-effort: a missing icon never fails the install
        self.fetch_icon(game);

        game.installed = true;
        log_install(&format!(
            "Game '{}' installed to {}",
            game.name,
            target.display()
        ));
        Ok(())
    }

    /// Delete the game's install directory. Missing directory is fine.
    pub fn remove(&self, game: &mut Game) -> Result<(), InstallError> {
        let target = game.install_dir(&self.games_root);
        if target.exists() {
            fs::remove_dir_all(&target).map_err(|e| fs_error(&target, e))?;
            log_install(&format!("Removed game '{}'", game.name));
        }

        if let Some(icon) = self.cached_icon(game) {
            let _ = fs::remove_file(icon);
        }

        game.installed = false;
        Ok(())
    }

    /// Path of the game's cached icon, if one has been fetched
    pub fn cached_icon(&self, game: &Game) -> Option<PathBuf> {
        let url = game.image_url.as_deref()?;
        let path = self.images_dir.join(icon_file_name(&game.name, url));
        path.is_file().then_some(path)
    }

    fn download<F>(&self, url: &str, dest: &Path, on_progress: &mut F) -> Result<(), InstallError>
    where
        F: FnMut(u64),
    {
        log_download(&format!("Downloading {}", url));

        let response = self
            .agent
            .get(url)
            .set("User-Agent", utils::USER_AGENT)
            .call()
            .map_err(|e| InstallError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let mut reader = response.into_reader();
        let mut file = File::create(dest).map_err(|e| fs_error(dest, e))?;

        let total =
            copy_with_progress(&mut reader, &mut file, on_progress).map_err(|e| {
                InstallError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            })?;
        file.flush().map_err(|e| fs_error(dest, e))?;

        log_download(&format!("Downloaded {} ({})", url, utils::human_size(total)));
        Ok(())
    }

    fn fetch_icon(&self, game: &Game) {
        let Some(url) = game.image_url.as_deref() else {
            return;
        };

        let dest = self.images_dir.join(icon_file_name(&game.name, url));
        if let Err(e) = utils::download_file(&self.agent, url, &dest) {
            log_warning(&format!("Could not fetch icon for '{}': {}", game.name, e));
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Copy `reader` to `writer`, invoking `on_progress` with cumulative bytes
/// after every chunk. Returns the total number of bytes copied.
pub fn copy_with_progress<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    on_progress: &mut F,
) -> io::Result<u64>
where
    R: Read,
    W: Write,
    F: FnMut(u64),
{
    let mut buf = [0u8; 64 * 1024];
    let mut total: u64 = 0;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        total += n as u64;
        on_progress(total);
    }

    Ok(total)
}

fn archive_kind(url: &str) -> ArchiveKind {
    let lower = url.to_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        ArchiveKind::TarGz
    } else {
        ArchiveKind::Zip
    }
}

fn archive_file_name(game: &Game) -> String {
    game.download_url
        .split('/')
        .next_back()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.zip", game.name))
}

fn icon_file_name(game_name: &str, url: &str) -> String {
    let ext = url
        .rsplit('.')
        .next()
        .filter(|ext| ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("png");
    format!("{}.{}", game_name, ext)
}

fn extract_archive(archive: &Path, target: &Path, kind: ArchiveKind) -> Result<(), InstallError> {
    fs::create_dir_all(target).map_err(|e| fs_error(target, e))?;

    let archive_error = |reason: String| InstallError::Archive {
        path: archive.display().to_string(),
        reason,
    };

    match kind {
        ArchiveKind::Zip => {
            let file = File::open(archive).map_err(|e| fs_error(archive, e))?;
            let mut zip = zip::ZipArchive::new(file).map_err(|e| archive_error(e.to_string()))?;
            zip.extract(target).map_err(|e| archive_error(e.to_string()))?;
        }
        ArchiveKind::TarGz => {
            let file = File::open(archive).map_err(|e| fs_error(archive, e))?;
            let decoder = flate2::read::GzDecoder::new(file);
            tar::Archive::new(decoder)
                .unpack(target)
                .map_err(|e| archive_error(e.to_string()))?;
        }
    }

    flatten_single_dir(target).map_err(|e| fs_error(target, e))
}

/// Some packages wrap everything in a single top-level folder; hoist its
/// contents so the game's entry point lands at the install dir root.
fn flatten_single_dir(target: &Path) -> io::Result<()> {
    let entries: Vec<_> = fs::read_dir(target)?.collect::<Result<_, _>>()?;
    if entries.len() != 1 {
        return Ok(());
    }

    let only = entries[0].path();
    if !only.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(&only)? {
        let entry = entry?;
        fs::rename(entry.path(), target.join(entry.file_name()))?;
    }
    fs::remove_dir(&only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out data in fixed-size chunks
    struct ChunkedReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(self.data.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn game(name: &str, url: &str) -> Game {
        Game {
            name: name.to_string(),
            title: name.to_string(),
            description: String::new(),
            version: String::new(),
            languages: Vec::new(),
            repository_name: "official".to_string(),
            description_url: String::new(),
            download_url: url.to_string(),
            image_url: None,
            size_bytes: 1000,
            published_at: None,
            installed: false,
        }
    }

    fn installer(root: &Path) -> Installer {
        Installer::new(
            root.join("games"),
            root.join("tmp"),
            root.join("images"),
        )
    }

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            let options = zip::write::SimpleFileOptions::default();
            if name.ends_with('/') {
                zip.add_directory(name.trim_end_matches('/'), options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data.as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_copy_with_progress_chunked() {
        let mut reader = ChunkedReader {
            data: vec![7u8; 1000],
            pos: 0,
            chunk: 100,
        };
        let mut out = Cursor::new(Vec::new());
        let mut reports = Vec::new();

        let total =
            copy_with_progress(&mut reader, &mut out, &mut |done| reports.push(done)).unwrap();

        assert_eq!(total, 1000);
        assert_eq!(out.get_ref().len(), 1000);
        // One report per chunk, strictly increasing, ending at the total
        assert_eq!(reports, vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000]);
    }

    #[test]
    fn test_extract_zip_into_target() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        write_zip(&archive, &[("main.lua", "-- entry"), ("img/cover.png", "png")]);

        let target = dir.path().join("games/galaxy");
        extract_archive(&archive, &target, ArchiveKind::Zip).unwrap();

        assert!(target.join("main.lua").is_file());
        assert!(target.join("img/cover.png").is_file());
    }

    #[test]
    fn test_extract_flattens_single_top_level_dir() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        write_zip(
            &archive,
            &[("galaxy-1.2/", ""), ("galaxy-1.2/main.lua", "-- entry")],
        );

        let target = dir.path().join("games/galaxy");
        extract_archive(&archive, &target, ArchiveKind::Zip).unwrap();

        // Entry point is at the install dir root, the wrapper dir is gone
        assert!(target.join("main.lua").is_file());
        assert!(!target.join("galaxy-1.2").exists());
    }

    #[test]
    fn test_extract_corrupt_archive_errors() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        fs::write(&archive, b"this is not a zip").unwrap();

        let target = dir.path().join("games/galaxy");
        let err = extract_archive(&archive, &target, ArchiveKind::Zip).unwrap_err();
        assert!(matches!(err, InstallError::Archive { .. }));
    }

    #[test]
    fn test_install_failure_cleans_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let inst = installer(dir.path());
        // Unresolvable host: the download fails before anything is unpacked
        let mut g = game("galaxy", "http://instman-test.invalid/galaxy.zip");

        let err = inst.install(&mut g, |_| {}).unwrap_err();
        assert!(matches!(err, InstallError::Network { .. }));
        assert!(!g.installed);
        assert!(!g.install_dir(&dir.path().join("games")).exists());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let inst = installer(dir.path());
        let games_root = dir.path().join("games");

        let mut g = game("galaxy", "http://example.com/galaxy.zip");
        let install_dir = g.install_dir(&games_root);
        fs::create_dir_all(install_dir.join("img")).unwrap();
        fs::write(install_dir.join("main.lua"), b"-- entry").unwrap();
        g.installed = true;

        inst.remove(&mut g).unwrap();
        assert!(!g.installed);
        assert!(!install_dir.exists());

        // Second removal: no directory, no error, state unchanged
        inst.remove(&mut g).unwrap();
        assert!(!g.installed);
    }

    #[test]
    fn test_archive_file_name() {
        let g = game("galaxy", "http://example.com/files/galaxy-1.2.zip");
        assert_eq!(archive_file_name(&g), "galaxy-1.2.zip");

        let g = game("galaxy", "http://example.com/files/");
        assert_eq!(archive_file_name(&g), "galaxy.zip");
    }

    #[test]
    fn test_icon_file_name() {
        assert_eq!(icon_file_name("galaxy", "http://e.com/galaxy.png"), "galaxy.png");
        assert_eq!(icon_file_name("galaxy", "http://e.com/icon"), "galaxy.png");
        assert_eq!(icon_file_name("galaxy", "http://e.com/i.jpeg"), "galaxy.jpeg");
    }
}

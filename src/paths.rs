use std::{path::PathBuf, sync::LazyLock};

pub static DEFAULT_DATA_PATH: LazyLock<PathBuf> = LazyLock::new(|| {
    if let Some(path) = std::env::var_os("INSTMAN_DATA_PATH") {
        return PathBuf::from(path);
    }

    let mut path = dirs::home_dir().unwrap_or_default();
    path.push(".instman");
    path
});

/// Computes a path under the InstMan data directory from the arguments.
///
/// Returns a `&Path` referencing the data directory itself if no arguments are
/// passed in, or a `PathBuf` created by joining all of the arguments to the
/// base data directory if at least one argument is passed in.
///
/// The base directory is `~/.instman`, overridable with the
/// `INSTMAN_DATA_PATH` environment variable.
#[macro_export]
macro_rules! instman_path {
    () => {
        $crate::paths::DEFAULT_DATA_PATH.as_path()
    };

    ( $( $path:expr ),+ $(,)? ) => {
        [
            $crate::paths::DEFAULT_DATA_PATH.as_path(),
            $( std::path::Path::new(&$path) ),+
        ].into_iter().collect::<std::path::PathBuf>()
    };
}

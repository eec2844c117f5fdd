//! Path utilities for unikv data files.
//!
//! # Base Directory
//! - [`data_dir`] - `UNIKV_HOME`, or the platform data directory + `unikv/`
//!
//! # Backend Files
//! - [`redb_path`] - `<dir>/<name>.redb` (name escaped by [`escape_name`])
//! - [`sqlite_path`] - `<dir>/<name>.sqlite3`
//! - [`local_storage_path`] - `<dir>/localstorage.json` (shared by all stores)

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::{Path, PathBuf};

/// Environment variable overriding the default data directory.
pub const HOME_ENV: &str = "UNIKV_HOME";

/// File name of the shared local-storage area.
pub const LOCAL_STORAGE_FILE: &str = "localstorage.json";

/// Get the default data directory.
///
/// Resolution order:
/// 1. `UNIKV_HOME` environment variable (if set and non-empty)
/// 2. Platform data directory (`~/.local/share/unikv` on Linux)
/// 3. `./.unikv` when no platform directory is known
pub fn data_dir() -> PathBuf {
    if let Ok(home) = std::env::var(HOME_ENV)
        && !home.is_empty()
    {
        return PathBuf::from(home);
    }

    dirs::data_dir().map_or_else(|| PathBuf::from(".unikv"), |d| d.join("unikv"))
}

/// Database file for the redb driver.
pub fn redb_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.redb", escape_name(name)))
}

/// Database file for the SQLite driver.
pub fn sqlite_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.sqlite3", escape_name(name)))
}

/// Shared local-storage file for a data directory.
pub fn local_storage_path(dir: &Path) -> PathBuf {
    dir.join(LOCAL_STORAGE_FILE)
}

/// Bytes kept as-is in an escaped name; everything else (including `%`)
/// becomes `%XX`, so distinct names never share an escaped form.
const NAME_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Escapes a database name for use as a file stem or key component.
pub fn escape_name(name: &str) -> String {
    utf8_percent_encode(name, NAME_ESCAPES).to_string()
}

/// Checks that `dir` exists (creating it if needed) and accepts new files.
pub fn is_writable_dir(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    tempfile::NamedTempFile::new_in(dir).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_data_dir_env_override() {
        // SAFETY: serialized with other env-mutating tests.
        unsafe { std::env::set_var(HOME_ENV, "/tmp/unikv-test-home") };
        assert_eq!(data_dir(), PathBuf::from("/tmp/unikv-test-home"));
        unsafe { std::env::remove_var(HOME_ENV) };
    }

    #[test]
    #[serial]
    fn test_data_dir_empty_env_ignored() {
        unsafe { std::env::set_var(HOME_ENV, "") };
        assert_ne!(data_dir(), PathBuf::from(""));
        unsafe { std::env::remove_var(HOME_ENV) };
    }

    #[test]
    fn test_backend_paths() {
        let dir = Path::new("/data");
        assert_eq!(redb_path(dir, "app"), PathBuf::from("/data/app.redb"));
        assert_eq!(sqlite_path(dir, "my app"), PathBuf::from("/data/my%20app.sqlite3"));
        assert_eq!(local_storage_path(dir), PathBuf::from("/data/localstorage.json"));
    }

    #[test]
    fn test_escaped_names_stay_distinct() {
        assert_eq!(escape_name("my-app_v1.2"), "my-app_v1.2");
        assert_eq!(escape_name("a/b"), "a%2Fb");
        assert_eq!(escape_name("caf\u{e9}"), "caf%C3%A9");

        let names = ["my app", "my_app", "my%20app", "my%app", "a/b", "a_b"];
        let escaped: std::collections::HashSet<_> = names.iter().map(|n| escape_name(n)).collect();
        assert_eq!(escaped.len(), names.len());
    }

    #[test]
    fn test_is_writable_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(is_writable_dir(&tmp.path().join("nested/dir")));
    }
}

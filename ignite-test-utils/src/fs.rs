//! Filesystem helpers for server-backed tests.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Overrides the directory holding server configuration files.
pub const TEST_CONFIG_PATH_ENV: &str = "IGNITE_NATIVE_TEST_THIN_CONFIG_PATH";

/// Points at the server installation.
pub const IGNITE_HOME_ENV: &str = "IGNITE_HOME";

const CONFIG_DIR_UNDER_HOME: [&str; 5] = ["modules", "platforms", "rust", "thin-client-test", "config"];

/// Resolves the server installation directory.
///
/// Uses `IGNITE_HOME` when it names a directory, otherwise the closest
/// ancestor of the working directory that contains `modules/platforms`.
pub fn resolve_home() -> Option<PathBuf> {
    if let Some(home) = non_empty_env(IGNITE_HOME_ENV) {
        let home = PathBuf::from(home);
        if home.is_dir() {
            return Some(home);
        }
        tracing::warn!(home = %home.display(), "IGNITE_HOME is not a directory");
    }

    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .find(|dir| dir.join("modules").join("platforms").is_dir())
        .map(Path::to_path_buf)
}

/// Resolves the directory holding server configuration files for tests.
pub fn test_config_dir() -> Option<PathBuf> {
    if let Some(path) = non_empty_env(TEST_CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    let mut dir = resolve_home()?;
    dir.extend(CONFIG_DIR_UNDER_HOME);
    Some(dir)
}

/// Deletes `home/work` recursively. A missing directory is not an error.
pub fn clear_work_dir(home: &Path) -> io::Result<()> {
    let work = home.join("work");
    match std::fs::remove_dir_all(&work) {
        Ok(()) => {
            tracing::debug!(path = %work.display(), "cleared work directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Counts the lines of a file that contain `needle`.
///
/// Lines are compared as raw bytes, so log lines that are not valid UTF-8
/// are still counted. A missing file has no lines.
pub fn line_occurrences_in_file(path: &Path, needle: &str) -> io::Result<usize> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let needle = needle.as_bytes();
    let mut count = 0;
    for line in BufReader::new(file).split(b'\n') {
        if contains_bytes(&line?, needle) {
            count += 1;
        }
    }
    Ok(count)
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_config_dir_prefers_override() {
        temp_env::with_vars(
            [
                (TEST_CONFIG_PATH_ENV, Some("/opt/ignite-test-config")),
                (IGNITE_HOME_ENV, Some("/nonexistent")),
            ],
            || {
                assert_eq!(
                    test_config_dir(),
                    Some(PathBuf::from("/opt/ignite-test-config"))
                );
            },
        );
    }

    #[test]
    #[serial]
    fn test_config_dir_under_home() {
        let home = tempfile::tempdir().unwrap();
        temp_env::with_vars(
            [
                (TEST_CONFIG_PATH_ENV, None::<&str>),
                (IGNITE_HOME_ENV, Some(home.path().to_str().unwrap())),
            ],
            || {
                let expected = home
                    .path()
                    .join("modules")
                    .join("platforms")
                    .join("rust")
                    .join("thin-client-test")
                    .join("config");
                assert_eq!(test_config_dir(), Some(expected));
            },
        );
    }

    #[test]
    #[serial]
    fn test_empty_override_is_ignored() {
        let home = tempfile::tempdir().unwrap();
        temp_env::with_vars(
            [
                (TEST_CONFIG_PATH_ENV, Some("")),
                (IGNITE_HOME_ENV, Some(home.path().to_str().unwrap())),
            ],
            || {
                assert!(test_config_dir().unwrap().starts_with(home.path()));
            },
        );
    }

    #[test]
    fn test_clear_work_dir() {
        let home = tempfile::tempdir().unwrap();
        let nested = home.path().join("work").join("db").join("node-1");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("part-0.bin"), b"data").unwrap();

        clear_work_dir(home.path()).unwrap();
        assert!(!home.path().join("work").exists());
        assert!(home.path().exists());

        // second call finds nothing to delete
        clear_work_dir(home.path()).unwrap();
    }

    #[test]
    fn test_line_occurrences() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "INFO topology snapshot [ver=1]").unwrap();
        writeln!(file, "WARN client connected").unwrap();
        writeln!(file, "INFO topology snapshot [ver=2]").unwrap();
        file.flush().unwrap();

        assert_eq!(line_occurrences_in_file(file.path(), "topology snapshot").unwrap(), 2);
        assert_eq!(line_occurrences_in_file(file.path(), "absent").unwrap(), 0);
    }

    #[test]
    fn test_line_occurrences_with_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"INFO node started\n").unwrap();
        file.write_all(b"WARN \xff\xfe node started with garbage\n").unwrap();
        file.write_all(b"\xc3\x28 unrelated\n").unwrap();
        file.write_all(b"INFO node started").unwrap();
        file.flush().unwrap();

        assert_eq!(line_occurrences_in_file(file.path(), "node started").unwrap(), 3);
        assert_eq!(line_occurrences_in_file(file.path(), "unrelated").unwrap(), 1);
    }

    #[test]
    fn test_line_occurrences_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            line_occurrences_in_file(&dir.path().join("missing.log"), "x").unwrap(),
            0
        );
    }
}

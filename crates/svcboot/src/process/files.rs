//! Log file opening for the daemon run path.

use std::fs::{self, File, OpenOptions};
use std::path::Path;

use super::LaunchError;

/// Opens `path` for appending, creating it and its parent directories.
///
/// # Errors
///
/// Returns [`LaunchError::LogDirectory`] or [`LaunchError::LogFile`].
pub fn open_log_file(path: &Path) -> Result<File, LaunchError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| LaunchError::LogDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LaunchError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn creates_parents_and_appends() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested/logs/app.log");
        let mut file = open_log_file(&path).expect("open log file");
        file.write_all(b"one\n").expect("write first line");
        drop(file);
        let mut file = open_log_file(&path).expect("reopen log file");
        file.write_all(b"two\n").expect("write second line");
        let contents = fs::read_to_string(&path).expect("read log file");
        assert_eq!(contents, "one\ntwo\n");
    }

    #[test]
    fn reports_directory_failures() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file").expect("write blocker");
        let error = open_log_file(&blocker.join("app.log")).expect_err("directory should fail");
        assert!(matches!(error, LaunchError::LogDirectory { .. }), "{error:?}");
    }
}

//! Control socket endpoint and its directory preparation.

use std::fmt;
use std::fs::DirBuilder;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unix domain socket the control plane listens on.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SocketEndpoint {
    path: PathBuf,
}

impl SocketEndpoint {
    /// Builds an endpoint for the socket file at `path`.
    #[must_use]
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the socket file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Ensures the socket's parent directory exists with restrictive permissions.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(parent) = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        else {
            return Err(SocketPreparationError::MissingParent {
                path: self.path.clone(),
            });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent)
            && source.kind() != std::io::ErrorKind::AlreadyExists
        {
            return Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            });
        }

        Ok(())
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unix://{}", self.path.display())
    }
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path has no parent directory to create.
    #[error("socket path '{}' has no parent directory", path.display())]
    MissingParent {
        /// Configured socket path.
        path: PathBuf,
    },
    /// Failed to create the socket directory.
    #[error("failed to create socket directory '{}': {source}", path.display())]
    CreateDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unix_socket() {
        let endpoint = SocketEndpoint::unix("/tmp/svc.sock");
        assert_eq!(endpoint.to_string(), "unix:///tmp/svc.sock");
    }

    #[test]
    fn prepare_filesystem_creates_missing_parents() {
        let dir = tempfile::tempdir().expect("temp dir");
        let endpoint = SocketEndpoint::unix(dir.path().join("nested/run/svc.sock"));
        endpoint.prepare_filesystem().expect("prepare socket directory");
        assert!(dir.path().join("nested/run").is_dir());
    }

    #[test]
    fn prepare_filesystem_rejects_bare_file_names() {
        let endpoint = SocketEndpoint::unix("svc.sock");
        let error = endpoint
            .prepare_filesystem()
            .expect_err("bare socket name has no parent");
        assert!(matches!(error, SocketPreparationError::MissingParent { .. }));
    }
}

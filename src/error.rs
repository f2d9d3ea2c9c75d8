// src/error.rs
use std::path::PathBuf;

/// Failures surfaced by the mirror and the news-flash dispatch.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Store credentials are missing or rejected.
    #[error("object store authentication failed: {0}")]
    Authentication(String),

    /// One listing (keyed by prefix) or one object download failed.
    #[error("transfer of `{key}` failed: {reason}")]
    Transfer { key: String, reason: String },

    #[error("fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("parsing {source_id} content failed: {reason}")]
    Parse { source_id: String, reason: String },

    /// Novelty marker file could not be read or written.
    #[error("marker state: {0}")]
    State(String),

    #[error("local io on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    pub fn transfer(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transfer {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short label used as a metrics/log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication",
            Self::Transfer { .. } => "transfer",
            Self::Fetch { .. } => "fetch",
            Self::Parse { .. } => "parse",
            Self::State(_) => "state",
            Self::Io { .. } => "io",
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_key_and_reason() {
        let e = IngestError::transfer("accidents_type_1/2020/a.csv", "connection reset");
        let s = e.to_string();
        assert!(s.contains("accidents_type_1/2020/a.csv"));
        assert!(s.contains("connection reset"));
        assert_eq!(e.kind(), "transfer");
    }

    #[test]
    fn io_error_keeps_source() {
        use std::error::Error as _;
        let e = IngestError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(e.source().is_some());
        assert_eq!(e.kind(), "io");
    }
}

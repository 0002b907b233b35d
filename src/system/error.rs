use std::io;

use thiserror::Error;

/// Failure to acquire a raw reading from the operating system.
///
/// Samplers never hand these to callers; they log and degrade to neutral
/// output instead.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{what} is unavailable: {source}")]
    Unavailable {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{what} is malformed: {detail}")]
    Malformed { what: &'static str, detail: String },

    #[error("permission denied: {detail}")]
    PermissionDenied { detail: String },

    #[error("not supported: {detail}")]
    Unsupported { detail: String },
}

impl SourceError {
    pub fn unavailable(what: &'static str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            return SourceError::PermissionDenied {
                detail: format!("{what}: {source}"),
            };
        }
        SourceError::Unavailable { what, source }
    }

    pub fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        SourceError::Malformed {
            what,
            detail: detail.into(),
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_are_classified() {
        let err = SourceError::unavailable(
            "/proc/stat",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, SourceError::PermissionDenied { .. }));
    }

    #[test]
    fn messages_name_the_source() {
        let err = SourceError::malformed("/proc/meminfo", "MemTotal missing");
        assert_eq!(err.to_string(), "/proc/meminfo is malformed: MemTotal missing");

        let err = SourceError::unavailable(
            "/proc/stat",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "/proc/stat is unavailable: gone");
    }
}

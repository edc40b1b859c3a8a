pub mod csv;

use std::io;

use thiserror::Error;

use crate::sampler::Sample;

/// A failed durable append.
///
/// Transient failures are worth retrying (interrupted writes, timeouts, a
/// momentarily full disk); permanent ones indicate a misconfigured or
/// unusable target and are surfaced to the operator instead.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("flush failed while {context} (retry-worthy): {source}")]
    Transient {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("flush failed while {context}: {source}")]
    Permanent {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl FlushError {
    /// Classifies an I/O error by kind.
    pub fn from_io(context: &'static str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::Unsupported => Self::Permanent { context, source },
            _ => Self::Transient { context, source },
        }
    }

    /// Returns true when retrying cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }
}

/// Sink consumes sample batches and appends them to durable storage.
///
/// A successful `flush` has made every record in the batch durable, in
/// capture order, before returning. A failed `flush` has written nothing, so
/// the caller may retry the same batch without duplicating records.
pub trait Sink: Send {
    /// Returns the sink's name for logging.
    fn name(&self) -> &str;

    /// Durably append a batch of samples.
    fn flush(
        &mut self,
        batch: &[Sample],
    ) -> impl std::future::Future<Output = Result<(), FlushError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_classifies_not_found_as_permanent() {
        let err = FlushError::from_io("opening log", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_permanent());
    }

    #[test]
    fn test_from_io_classifies_permission_denied_as_permanent() {
        let err = FlushError::from_io(
            "opening log",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.is_permanent());
    }

    #[test]
    fn test_from_io_classifies_interrupted_as_transient() {
        let err = FlushError::from_io("appending", io::Error::from(io::ErrorKind::Interrupted));
        assert!(!err.is_permanent());
    }
}

use std::io;

/// Errors raised by the CPU stress controller.
#[derive(Debug, thiserror::Error)]
pub enum StressError {
    /// A start parameter was out of range. Nothing was started.
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: i64,
        reason: &'static str,
    },
    /// The stress test feature is switched off at the boundary.
    #[error("CPU stress test feature is disabled")]
    Unavailable,
    /// A worker thread could not be launched; the run was abandoned.
    #[error("failed to launch cpu worker {index}: {source}")]
    WorkerSpawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameter_names_the_field() {
        let err = StressError::InvalidParameter {
            name: "load",
            value: 150,
            reason: "must be between 0 and 100",
        };
        assert_eq!(
            err.to_string(),
            "invalid parameter `load` = 150: must be between 0 and 100"
        );
    }

    #[test]
    fn worker_spawn_keeps_source() {
        let err = StressError::WorkerSpawn {
            index: 3,
            source: io::Error::new(io::ErrorKind::WouldBlock, "no threads left"),
        };
        assert!(err.to_string().contains("worker 3"));
        assert!(std::error::Error::source(&err).is_some());
    }
}

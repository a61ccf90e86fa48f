use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures to get any output at all out of an external Slurm command
///
/// These mean the cluster is unreachable from where we sit, and are recovered by the query
/// layer, which substitutes an empty listing
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("could not run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    Status {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("could not read output of `{program}`: {reason}")]
    Output { program: String, reason: String },
}

/// Errors surfaced to callers of the cache
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlurmError {
    /// The command succeeded but printed something we cannot make sense of. This is an
    /// integration break with the installed Slurm version, not a transient failure
    #[error("malformed response from `{command}`: {reason}")]
    MalformedResponse { command: String, reason: String },
}

impl SlurmError {
    pub fn malformed(command: &str, reason: impl ToString) -> Self {
        SlurmError::MalformedResponse {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("`{field}` must be a non-negative number of seconds, got {value}")]
    InvalidTtl { field: &'static str, value: i64 },
    #[error("`{field}` must hold at least one entry, got {value}")]
    InvalidCapacity { field: &'static str, value: i64 },
    #[error("`command_timeout` must be a positive number of seconds, got {0}")]
    InvalidTimeout(i64),
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

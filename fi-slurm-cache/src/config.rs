use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

static CONF_FN: &str = "slurm-cache.toml";
pub static CONF_ENV: &str = "FI_SLURM_CACHE_CONF";

/// Tunables for the three caches and the commands behind them
///
/// Durations are whole seconds. They are signed so that a negative value in a config file
/// is reported instead of silently wrapping
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub info_cache_ttl: i64,
    pub acct_cache_ttl: i64,
    pub acct_cache_size: i64,
    pub res_cache_ttl: i64,
    pub command_timeout: i64,
    pub scontrol: String,
    pub sacctmgr: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            info_cache_ttl: 300,
            acct_cache_ttl: 300,
            acct_cache_size: 100,
            res_cache_ttl: 300,
            command_timeout: 30,
            scontrol: "scontrol".to_string(),
            sacctmgr: "sacctmgr".to_string(),
        }
    }
}

/// Validated form of `CacheConfig`, what the cache is actually built from
#[derive(Debug, Clone)]
pub(crate) struct CacheSettings {
    pub info_ttl: Duration,
    pub acct_ttl: Duration,
    pub acct_capacity: usize,
    pub res_ttl: Duration,
    pub command_timeout: Duration,
}

fn ttl(field: &'static str, value: i64) -> Result<Duration, ConfigError> {
    u64::try_from(value)
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidTtl { field, value })
}

impl CacheConfig {
    pub(crate) fn validate(&self) -> Result<CacheSettings, ConfigError> {
        let acct_capacity = usize::try_from(self.acct_cache_size)
            .ok()
            .filter(|size| *size > 0)
            .ok_or(ConfigError::InvalidCapacity {
                field: "acct_cache_size",
                value: self.acct_cache_size,
            })?;

        if self.command_timeout <= 0 {
            return Err(ConfigError::InvalidTimeout(self.command_timeout));
        }

        Ok(CacheSettings {
            info_ttl: ttl("info_cache_ttl", self.info_cache_ttl)?,
            acct_ttl: ttl("acct_cache_ttl", self.acct_cache_ttl)?,
            acct_capacity,
            res_ttl: ttl("res_cache_ttl", self.res_cache_ttl)?,
            command_timeout: Duration::from_secs(self.command_timeout as u64),
        })
    }

    /// Reads a config from a TOML file. Fields missing from the file keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Finds and loads the config file
    ///
    /// Looks at, in order: the explicit path, `$FI_SLURM_CACHE_CONF`, and `slurm-cache.toml` in
    /// the binary's directory. Falls back to the defaults when none of them exists. An explicit
    /// path that cannot be read is an error
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match discover() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading cache config");
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }
}

fn discover() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONF_ENV) {
        return Some(PathBuf::from(path));
    }
    if let Ok(exe_path) = env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        let conf_path = exe_dir.join(CONF_FN);
        if conf_path.is_file() {
            return Some(conf_path);
        }
    }
    None
}

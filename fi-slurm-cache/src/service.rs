use std::convert::Infallible;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::accounts::fetch_accounts;
use crate::cache::{Clock, SystemClock, TtlCache};
use crate::command::{CommandRunner, SystemRunner};
use crate::config::CacheConfig;
use crate::error::{ConfigError, SlurmError};
use crate::nodes::{NodeInfo, fetch_node_info};
use crate::reservations::{Reservation, fetch_reservations, filter_active};

const SINGLE: NonZeroUsize = NonZeroUsize::MIN;

/// Cached view of what the cluster offers, for filling in job submission forms
///
/// Node inventory, account associations and reservations are each fetched at most once per
/// TTL (per user, for accounts). The `available_*` views are recomputed from the cached node
/// inventory on every call. One instance is meant to be shared by the whole host, behind an `Arc`
pub struct SlurmCache {
    runner: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
    scontrol: String,
    sacctmgr: String,
    node_info: TtlCache<(), Arc<NodeInfo>>,
    accounts: TtlCache<String, Arc<Vec<String>>>,
    reservations: TtlCache<(), Arc<Vec<Reservation>>>,
}

impl SlurmCache {
    /// Builds a cache that runs the real Slurm commands
    pub fn from_config(config: CacheConfig) -> Result<Self, ConfigError> {
        let settings = config.validate()?;
        let runner = Arc::new(SystemRunner::new(settings.command_timeout));
        Self::new(config, runner, Arc::new(SystemClock))
    }

    pub fn new(
        config: CacheConfig,
        runner: Arc<dyn CommandRunner>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let settings = config.validate()?;
        let acct_capacity = NonZeroUsize::new(settings.acct_capacity).unwrap_or(SINGLE);

        Ok(SlurmCache {
            node_info: TtlCache::new("node_info", SINGLE, settings.info_ttl, clock.clone()),
            accounts: TtlCache::new("accounts", acct_capacity, settings.acct_ttl, clock.clone()),
            reservations: TtlCache::new("reservations", SINGLE, settings.res_ttl, clock.clone()),
            runner,
            clock,
            scontrol: config.scontrol,
            sacctmgr: config.sacctmgr,
        })
    }

    /// The node inventory, fetched if the cached one is missing or stale
    pub fn node_info(&self) -> Result<Arc<NodeInfo>, SlurmError> {
        self.node_info.get_or_try_insert_with((), || {
            fetch_node_info(self.runner.as_ref(), &self.scontrol).map(Arc::new)
        })
    }

    /// Every non-maintenance reservation, fetched if the cached list is missing or stale
    pub fn reservations(&self) -> Result<Arc<Vec<Reservation>>, SlurmError> {
        self.reservations.get_or_try_insert_with((), || {
            fetch_reservations(self.runner.as_ref(), &self.scontrol).map(Arc::new)
        })
    }

    pub fn is_online(&self) -> Result<bool, SlurmError> {
        Ok(self.node_info()?.is_online())
    }

    pub fn available_cpu_counts(&self) -> Result<Vec<u32>, SlurmError> {
        Ok(self.node_info()?.available_cpu_counts())
    }

    pub fn available_mem_sizes(&self) -> Result<Vec<u64>, SlurmError> {
        Ok(self.node_info()?.available_mem_sizes())
    }

    pub fn available_generic_resources(&self) -> Result<Vec<String>, SlurmError> {
        Ok(self.node_info()?.available_generic_resources())
    }

    pub fn available_partitions(&self) -> Result<Vec<String>, SlurmError> {
        Ok(self.node_info()?.available_partitions())
    }

    pub fn available_features(&self) -> Result<Vec<String>, SlurmError> {
        Ok(self.node_info()?.available_features())
    }

    /// Accounts `username` is associated with. Empty when sacctmgr cannot be reached
    pub fn accounts_for(&self, username: &str) -> Arc<Vec<String>> {
        let Ok(accounts) = self
            .accounts
            .get_or_try_insert_with(username.to_string(), || {
                Ok::<_, Infallible>(Arc::new(fetch_accounts(
                    self.runner.as_ref(),
                    &self.sacctmgr,
                    username,
                )))
            });
        accounts
    }

    /// Reservations open right now to `username`, or to any of `accounts`
    pub fn active_reservations(
        &self,
        username: &str,
        accounts: &[String],
    ) -> Result<Vec<Reservation>, SlurmError> {
        let reservations = self.reservations()?;
        Ok(filter_active(&reservations, username, accounts, self.clock.now())
            .into_iter()
            .cloned()
            .collect())
    }
}

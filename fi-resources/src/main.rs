pub mod report;

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use fi_slurm_cache::{CacheConfig, SlurmCache};
use tracing_subscriber::EnvFilter;
use users::get_current_username;

use crate::report::{build_report, print_report};

/// The main entry point for the `fi-resources` utility
///
/// Builds one cache the way a spawner would at startup, then reads every view from it:
/// 1. Load the config file and apply command line overrides
/// 2. Query node inventory, accounts and reservations through the cache
/// 3. Print the choices a job form would offer, as text or JSON
fn main() -> Result<(), String> {
    let start = Instant::now();

    let args = Args::parse();
    init_logging(args.debug);

    let mut config = CacheConfig::load(args.config.as_deref()).map_err(|e| e.to_string())?;
    args.apply_overrides(&mut config);
    if args.debug {
        println!("Loaded config {:?}: {:?}", config, start.elapsed());
    }

    let cache = SlurmCache::from_config(config).map_err(|e| e.to_string())?;

    // getting the user name passed in, or else the one running this process
    let user_name = match args.user {
        Some(user) => user,
        None => get_current_username()
            .ok_or("Could not determine the current user; pass one explicitly")?
            .to_string_lossy()
            .into_owned(),
    };

    tracing::debug!(user = %user_name, "building resource report");
    let report = build_report(&cache, &user_name).map_err(|e| e.to_string())?;
    if args.debug {
        println!("Finished querying Slurm: {:?}", start.elapsed());
    }

    if args.repeat {
        // a second pass must be served entirely from the cache
        let again = Instant::now();
        build_report(&cache, &user_name).map_err(|e| e.to_string())?;
        println!("Cached pass took {:?}", again.elapsed());
    }

    if args.json {
        let out = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{out}");
    } else {
        print_report(&report, args.no_color);
    }

    if args.debug {
        println!("Finished printing report: {:?}", start.elapsed());
    }
    Ok(())
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

const HELP: &str = "Show the resources a Slurm cluster currently offers to a user: CPU counts, memory sizes, GRES, partitions and node features, plus the user's accounts and the reservations open to them. Results are cached per the configured TTLs; when the cluster cannot be reached every list is empty.";

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    after_help = HELP,
    after_long_help = format!("{}\n\n{}", HELP, fi_slurm_cache::AUTHOR_HELP),
)]
struct Args {
    #[arg(help = "The username to show accounts and reservations for. Defaults to the current user.")]
    user: Option<String>,

    #[arg(short, long, value_name = "PATH")]
    #[arg(
        help = "Config file to read instead of $FI_SLURM_CACHE_CONF or slurm-cache.toml next to the binary"
    )]
    config: Option<PathBuf>,

    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How long the node inventory is cached")]
    info_ttl: Option<i64>,

    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How long each user's accounts are cached")]
    acct_ttl: Option<i64>,

    #[arg(long, value_name = "ENTRIES")]
    #[arg(help = "How many users' accounts are cached at once")]
    acct_size: Option<i64>,

    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How long the reservation list is cached")]
    res_ttl: Option<i64>,

    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "Kill scontrol/sacctmgr if they run longer than this")]
    timeout: Option<i64>,

    #[arg(long, value_name = "PATH")]
    #[arg(help = "Path to the scontrol binary")]
    scontrol: Option<String>,

    #[arg(long, value_name = "PATH")]
    #[arg(help = "Path to the sacctmgr binary")]
    sacctmgr: Option<String>,

    #[arg(short, long)]
    #[arg(help = "Print the report as JSON")]
    json: bool,

    #[arg(long)]
    #[arg(help = "Disable colors in output")]
    no_color: bool,

    #[arg(long, hide = true)]
    #[arg(help = "Query everything twice to check the second pass is cached")]
    repeat: bool,

    #[arg(long, hide = true)]
    #[arg(help = "Prints debug-level logging steps to terminal")]
    debug: bool,
}

impl Args {
    fn apply_overrides(&self, config: &mut CacheConfig) {
        if let Some(ttl) = self.info_ttl {
            config.info_cache_ttl = ttl;
        }
        if let Some(ttl) = self.acct_ttl {
            config.acct_cache_ttl = ttl;
        }
        if let Some(size) = self.acct_size {
            config.acct_cache_size = size;
        }
        if let Some(ttl) = self.res_ttl {
            config.res_cache_ttl = ttl;
        }
        if let Some(timeout) = self.timeout {
            config.command_timeout = timeout;
        }
        if let Some(path) = &self.scontrol {
            config.scontrol = path.clone();
        }
        if let Some(path) = &self.sacctmgr {
            config.sacctmgr = path.clone();
        }
    }
}

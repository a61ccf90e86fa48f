use chrono::{DateTime, Local, Utc};
use colored::*;
use fi_slurm_cache::{Reservation, SlurmCache, SlurmError};
use serde::Serialize;

/// Everything a job submission form needs to offer one user
#[derive(Debug, Serialize)]
pub struct ResourceReport {
    pub user: String,
    pub online: bool,
    pub cpus: Vec<u32>,
    /// In MB
    pub memory: Vec<u64>,
    pub gres: Vec<String>,
    pub partitions: Vec<String>,
    pub features: Vec<String>,
    pub accounts: Vec<String>,
    pub reservations: Vec<ReservationEntry>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ReservationEntry {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl From<Reservation> for ReservationEntry {
    fn from(res: Reservation) -> Self {
        ReservationEntry {
            name: res.name,
            start_time: res.start_time,
            end_time: res.end_time,
        }
    }
}

pub fn build_report(cache: &SlurmCache, user: &str) -> Result<ResourceReport, SlurmError> {
    let accounts = cache.accounts_for(user);
    let reservations = cache
        .active_reservations(user, &accounts)?
        .into_iter()
        .map(ReservationEntry::from)
        .collect();

    Ok(ResourceReport {
        user: user.to_string(),
        online: cache.is_online()?,
        cpus: cache.available_cpu_counts()?,
        memory: cache.available_mem_sizes()?,
        gres: cache.available_generic_resources()?,
        partitions: cache.available_partitions()?,
        features: cache.available_features()?,
        accounts: accounts.to_vec(),
        reservations,
    })
}

/// Formats a memory size given in MB the way Slurm users write it
fn format_mem(mb: u64) -> String {
    if mb >= 1024 * 1024 && mb % (1024 * 1024) == 0 {
        format!("{}T", mb / (1024 * 1024))
    } else if mb >= 1024 && mb % 1024 == 0 {
        format!("{}G", mb / 1024)
    } else {
        format!("{}M", mb)
    }
}

fn print_row(label: &str, values: &[String]) {
    let shown = if values.is_empty() {
        "(none)".dimmed().to_string()
    } else {
        values.join(", ")
    };
    println!("{:<14} {}", label.bold(), shown);
}

pub fn print_report(report: &ResourceReport, no_color: bool) {
    if no_color {
        colored::control::set_override(false);
    }

    let status = if report.online {
        "online".green()
    } else {
        "unreachable".red()
    };
    println!("{:<14} {}", "Cluster".bold(), status);
    println!("{}", "═".repeat(60));

    print_row(
        "CPUs",
        &report.cpus.iter().map(u32::to_string).collect::<Vec<_>>(),
    );
    print_row(
        "Memory",
        &report.memory.iter().map(|&mb| format_mem(mb)).collect::<Vec<_>>(),
    );
    print_row("GRES", &report.gres);
    print_row("Partitions", &report.partitions);
    print_row("Features", &report.features);

    println!();
    print_row(&format!("Accounts ({})", report.user), &report.accounts);

    if report.reservations.is_empty() {
        print_row("Reservations", &[]);
    } else {
        println!("{}", "Reservations".bold());
        for res in &report.reservations {
            println!(
                "  {:<24} {} → {}",
                res.name.cyan(),
                res.start_time.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                res.end_time.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            );
        }
    }
}

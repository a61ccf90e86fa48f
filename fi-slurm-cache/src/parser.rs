//! Parsing of the output of `scontrol --json` and `sacctmgr -P`
//!
//! Only the fields the cache needs are modelled. Everything else Slurm prints is ignored, so
//! minor version changes in the JSON do not break parsing unless they touch these fields.

use serde::Deserialize;

/// Top level of `scontrol --json show node`
#[derive(Debug, Deserialize)]
pub struct NodeListing {
    #[serde(default)]
    pub nodes: Vec<RawNode>,
}

/// One node as reported by `scontrol --json show node`
#[derive(Debug, Deserialize)]
pub struct RawNode {
    pub cpus: u32,
    /// In MB
    pub real_memory: u64,
    /// Memory set aside for the system (MemSpecLimit), in MB
    #[serde(default)]
    pub specialized_memory: u64,
    pub gres: Option<String>,
    #[serde(default)]
    pub partitions: Vec<String>,
    #[serde(default)]
    pub active_features: Vec<String>,
}

/// Top level of `scontrol show res --json`
///
/// Entries are kept as raw JSON so their flags can be checked before the rest of the entry is
/// required to be well formed
#[derive(Debug, Deserialize)]
pub struct ReservationListing {
    #[serde(default)]
    pub reservations: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ReservationFlags {
    flags: Vec<String>,
}

/// The flags of one raw reservation entry
pub fn reservation_flags(entry: &serde_json::Value) -> Result<Vec<String>, serde_json::Error> {
    ReservationFlags::deserialize(entry).map(|f| f.flags)
}

/// Parses one raw reservation entry in full
pub fn parse_reservation(entry: serde_json::Value) -> Result<RawReservation, serde_json::Error> {
    RawReservation::deserialize(entry)
}

#[derive(Debug, Deserialize)]
pub struct RawReservation {
    pub name: String,
    pub users: String,
    pub accounts: String,
    pub start_time: EpochField,
    pub end_time: EpochField,
}

/// A timestamp as printed by the Slurm REST/JSON serializers
///
/// Older releases print a bare integer; newer ones wrap it as
/// `{"set": true, "infinite": false, "number": 1700000000}`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum EpochField {
    Bare(i64),
    Wrapped { number: i64 },
}

impl EpochField {
    pub fn seconds(self) -> i64 {
        match self {
            EpochField::Bare(n) | EpochField::Wrapped { number: n } => n,
        }
    }
}

pub fn parse_node_listing(json: &str) -> Result<NodeListing, serde_json::Error> {
    serde_json::from_str(json)
}

pub fn parse_reservation_listing(json: &str) -> Result<ReservationListing, serde_json::Error> {
    serde_json::from_str(json)
}

/// Parses `sacctmgr ... format=account -P --noheader` output: one account per line
pub fn parse_account_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

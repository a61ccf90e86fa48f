use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::command::CommandRunner;
use crate::error::SlurmError;
use crate::parser::{
    RawReservation, parse_reservation, parse_reservation_listing, reservation_flags,
};
use crate::utils::{split_comma_list, time_t_to_datetime};

/// Arguments to `scontrol` listing the reservations
pub const RESERVATION_QUERY_ARGS: [&str; 3] = ["show", "res", "--json"];

/// Flag marking a reservation held for cluster maintenance
pub const MAINT_FLAG: &str = "MAINT";

/// A time-windowed grant of cluster access to some users and accounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub name: String,
    pub users: HashSet<String>,
    pub accounts: HashSet<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Reservation {
    fn from_raw(raw: RawReservation, command: &str) -> Result<Self, SlurmError> {
        let convert = |seconds: i64| {
            time_t_to_datetime(seconds).ok_or_else(|| {
                SlurmError::malformed(
                    command,
                    format!("reservation {}: timestamp {seconds} out of range", raw.name),
                )
            })
        };
        let start_time = convert(raw.start_time.seconds())?;
        let end_time = convert(raw.end_time.seconds())?;

        Ok(Reservation {
            users: split_comma_list(&raw.users),
            accounts: split_comma_list(&raw.accounts),
            start_time,
            end_time,
            name: raw.name,
        })
    }

    /// `now` lies within the window, both ends included
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now <= self.end_time
    }

    /// The user is listed by name, or shares at least one account with the reservation
    pub fn admits(&self, username: &str, accounts: &HashSet<&str>) -> bool {
        self.users.contains(username)
            || self
                .accounts
                .iter()
                .any(|account| accounts.contains(account.as_str()))
    }
}

/// Lists the reservations, leaving out maintenance ones
///
/// A command that cannot be run or fails gives an empty list. Output that is not a reservation
/// listing is an error
pub fn fetch_reservations(
    runner: &dyn CommandRunner,
    scontrol: &str,
) -> Result<Vec<Reservation>, SlurmError> {
    let output = match runner.run(scontrol, &RESERVATION_QUERY_ARGS) {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(error = %e, "reservation listing unavailable, reporting none");
            return Ok(Vec::new());
        }
    };

    let command = format!("{scontrol} show res --json");
    let listing =
        parse_reservation_listing(&output).map_err(|e| SlurmError::malformed(&command, e))?;

    let mut reservations = Vec::with_capacity(listing.reservations.len());
    for entry in listing.reservations {
        // maintenance entries are dropped before anything but their flags is looked at
        let flags = reservation_flags(&entry).map_err(|e| SlurmError::malformed(&command, e))?;
        if flags.iter().any(|flag| flag == MAINT_FLAG) {
            tracing::debug!(reservation = ?entry.get("name"), "skipping maintenance reservation");
            continue;
        }
        let raw = parse_reservation(entry).map_err(|e| SlurmError::malformed(&command, e))?;
        reservations.push(Reservation::from_raw(raw, &command)?);
    }
    tracing::debug!(count = reservations.len(), "loaded reservations");
    Ok(reservations)
}

/// The reservations open to `username` or any of `accounts` at `now`, in listing order
pub fn filter_active<'a>(
    reservations: &'a [Reservation],
    username: &str,
    accounts: &[String],
    now: DateTime<Utc>,
) -> Vec<&'a Reservation> {
    if reservations.is_empty() {
        return Vec::new();
    }
    let accounts: HashSet<&str> = accounts.iter().map(String::as_str).collect();
    reservations
        .iter()
        .filter(|res| res.is_active_at(now) && res.admits(username, &accounts))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandError;
    use chrono::Duration;
    use serde_json::json;

    struct Listing(String);

    impl CommandRunner for Listing {
        fn run(&self, _program: &str, args: &[&str]) -> Result<String, CommandError> {
            assert_eq!(args, RESERVATION_QUERY_ARGS);
            Ok(self.0.clone())
        }
    }

    fn reservation(users: &str, accounts: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Reservation {
        Reservation {
            name: "res".to_string(),
            users: split_comma_list(users),
            accounts: split_comma_list(accounts),
            start_time: start,
            end_time: end,
        }
    }

    fn names(found: Vec<&Reservation>) -> Vec<&str> {
        found.into_iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn user_or_account_match() {
        let now = Utc::now();
        let res = [reservation("alice", "teamA", now - Duration::hours(1), now + Duration::hours(1))];

        assert_eq!(filter_active(&res, "bob", &["teamA".to_string()], now).len(), 1);
        assert_eq!(filter_active(&res, "alice", &[], now).len(), 1);
        assert!(filter_active(&res, "carol", &["teamB".to_string()], now).is_empty());
    }

    #[test]
    fn window_bounds_inclusive() {
        let start = time_t_to_datetime(1_000).unwrap();
        let end = time_t_to_datetime(2_000).unwrap();
        let res = [reservation("alice", "", start, end)];

        assert_eq!(filter_active(&res, "alice", &[], start).len(), 1);
        assert_eq!(filter_active(&res, "alice", &[], end).len(), 1);
        assert!(filter_active(&res, "alice", &[], start - Duration::seconds(1)).is_empty());
        assert!(filter_active(&res, "alice", &[], end + Duration::seconds(1)).is_empty());
    }

    #[test]
    fn listing_order_kept() {
        let now = Utc::now();
        let mut res = Vec::new();
        for name in ["zeta", "alpha", "mid"] {
            let mut r = reservation("alice", "", now, now + Duration::hours(1));
            r.name = name.to_string();
            res.push(r);
        }
        assert_eq!(names(filter_active(&res, "alice", &[], now)), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn empty_user_list_matches_nobody_by_name() {
        let now = Utc::now();
        let res = [reservation("", "", now, now)];
        assert!(filter_active(&res, "", &["".to_string()], now).is_empty());
    }

    #[test]
    fn maintenance_entries_skipped_before_parsing() {
        let runner = Listing(
            json!({
                "reservations": [
                    {
                        "name": "maint", "flags": ["MAINT", "IGNORE_JOBS"], "users": null,
                        "start_time": "soon"
                    },
                    {
                        "name": "ok", "flags": [], "users": "alice", "accounts": "",
                        "start_time": 100, "end_time": {"number": 200}
                    }
                ]
            })
            .to_string(),
        );
        let found = fetch_reservations(&runner, "scontrol").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "ok");
        assert!(found[0].users.contains("alice"));
    }

    #[test]
    fn malformed_regular_entry_is_an_error() {
        let runner = Listing(
            json!({
                "reservations": [
                    {"name": "bad", "flags": [], "users": null, "accounts": "",
                     "start_time": 100, "end_time": 200}
                ]
            })
            .to_string(),
        );
        assert!(matches!(
            fetch_reservations(&runner, "scontrol"),
            Err(SlurmError::MalformedResponse { .. })
        ));
    }
}

use crate::command::CommandRunner;
use crate::parser::parse_account_lines;

/// Arguments to `sacctmgr` listing the accounts `username` is associated with
pub fn account_query_args(username: &str) -> [&str; 7] {
    [
        "show",
        "user",
        username,
        "withassoc",
        "format=account",
        "-P",
        "--noheader",
    ]
}

/// Looks up the accounts a user can charge jobs to, in the order sacctmgr lists them
///
/// Any failure to run sacctmgr is treated as "no accounts". Since the output is one bare name per
/// line there is no way for it to be malformed
pub fn fetch_accounts(runner: &dyn CommandRunner, sacctmgr: &str, username: &str) -> Vec<String> {
    match runner.run(sacctmgr, &account_query_args(username)) {
        Ok(output) => {
            let accounts = parse_account_lines(&output);
            tracing::debug!(username, count = accounts.len(), "loaded account associations");
            accounts
        }
        Err(e) => {
            tracing::warn!(username, error = %e, "account lookup failed, reporting no accounts");
            Vec::new()
        }
    }
}

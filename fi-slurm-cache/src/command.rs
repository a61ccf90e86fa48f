use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::CommandError;

/// Runs an external program and hands back its standard output
///
/// This is the only way the cache talks to Slurm, so tests can stand in for the cluster
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError>;
}

/// Runs commands as real subprocesses, killing any that outlive `timeout`
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        SystemRunner { timeout }
    }
}

/// Kills and waits on a child we are giving up on, so it leaves no zombie behind
fn reap(child: &mut Child) {
    // the child may have exited already, in which case kill fails and wait just collects it
    let _ = child.kill();
    let _ = child.wait();
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        tracing::debug!(program, ?args, "running command");
        let start = Instant::now();

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Drain both pipes off-thread: a node listing easily outgrows the pipe buffer, and
        // the child would block on write while we wait on it
        let drain = |pipe: Option<Box<dyn Read + Send>>| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                if let Some(mut pipe) = pipe {
                    pipe.read_to_end(&mut buf).map(|_| buf)
                } else {
                    Ok(buf)
                }
            })
        };
        let stdout = drain(child.stdout.take().map(|p| Box::new(p) as Box<dyn Read + Send>));
        let stderr = drain(child.stderr.take().map(|p| Box::new(p) as Box<dyn Read + Send>));

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() >= self.timeout => {
                    reap(&mut child);
                    tracing::warn!(program, timeout = ?self.timeout, "command timed out");
                    return Err(CommandError::Timeout {
                        program: program.to_string(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    reap(&mut child);
                    return Err(CommandError::Output {
                        program: program.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        };

        let join = |handle: thread::JoinHandle<std::io::Result<Vec<u8>>>| {
            handle
                .join()
                .map_err(|_| "reader thread panicked".to_string())
                .and_then(|read| read.map_err(|e| e.to_string()))
                .map_err(|reason| CommandError::Output {
                    program: program.to_string(),
                    reason,
                })
        };
        let stdout = join(stdout)?;
        let stderr = join(stderr)?;

        tracing::debug!(program, elapsed = ?start.elapsed(), %status, "command finished");

        if !status.success() {
            return Err(CommandError::Status {
                program: program.to_string(),
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        String::from_utf8(stdout).map_err(|e| CommandError::Output {
            program: program.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner() -> SystemRunner {
        SystemRunner::new(Duration::from_secs(10))
    }

    #[test]
    fn captures_stdout() {
        let out = runner().run("sh", &["-c", "printf 'a\\nb\\n'"]).unwrap();
        assert_eq!(out, "a\nb\n");
    }

    #[test]
    fn large_output_does_not_block() {
        let out = runner()
            .run("sh", &["-c", "head -c 1000000 /dev/zero | tr '\\0' x"])
            .unwrap();
        assert_eq!(out.len(), 1_000_000);
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = runner()
            .run("/nonexistent/definitely-not-scontrol", &[])
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let err = runner()
            .run("sh", &["-c", "echo 'slurm_load_node error' >&2; exit 1"])
            .unwrap_err();
        match err {
            CommandError::Status { stderr, .. } => assert_eq!(stderr, "slurm_load_node error"),
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn slow_command_times_out() {
        let err = SystemRunner::new(Duration::from_millis(100))
            .run("sleep", &["5"])
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }

    #[test]
    fn reap_collects_running_child() {
        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        reap(&mut child);
        assert!(child.try_wait().unwrap().is_some());
        // a second reap on an exited child is harmless
        reap(&mut child);
    }
}

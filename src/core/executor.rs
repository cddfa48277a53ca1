//! Remote command execution with one pooled session per host.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::roles::Host;
use crate::ssh::{CommandOutput, SshConnector};

/// An open connection to one host. Commands run one at a time.
pub trait Session {
    /// Run `command` to completion. `Err` means the connection itself
    /// failed; a non-zero exit is reported through `CommandOutput`.
    fn run(&mut self, command: &str) -> Result<CommandOutput>;

    fn close(&mut self) {}
}

/// Transport seam: opens sessions to hosts.
pub trait Connector {
    fn connect(&mut self, host: &Host) -> Result<Box<dyn Session>>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub host: String,
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub struct Executor {
    // Declared before `connector` so sessions are dropped first.
    sessions: HashMap<String, Box<dyn Session>>,
    connector: Box<dyn Connector>,
    results: Vec<ExecutionResult>,
}

impl Executor {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            sessions: HashMap::new(),
            connector: Box::new(connector),
            results: Vec::new(),
        }
    }

    pub fn ssh() -> Result<Self> {
        Ok(Self::new(SshConnector::new()?))
    }

    pub fn dry_run() -> Self {
        Self::new(DryRunConnector)
    }

    /// Run `command` on `host`; a non-zero exit is a `remote.command_failed` error.
    pub fn execute(&mut self, host: &Host, command: &str) -> Result<ExecutionResult> {
        let result = self.run(host, command)?;

        if !result.success() {
            return Err(Error::remote_command_failed(RemoteCommandFailedDetails {
                command: result.command.clone(),
                exit_code: result.exit_code,
                stdout: result.stdout.clone(),
                stderr: result.stderr.clone(),
                host: result.host.clone(),
            }));
        }

        Ok(result)
    }

    /// Run `command` on `host` and return its result whatever the exit status.
    pub fn run(&mut self, host: &Host, command: &str) -> Result<ExecutionResult> {
        let key = host.key();

        if !self.sessions.contains_key(&key) {
            let session = self.connector.connect(host)?;
            self.sessions.insert(key.clone(), session);
        }

        log_status!("run", "{} $ {}", host.address, command);

        let started_at = Utc::now();
        let outcome = match self.sessions.get_mut(&key) {
            Some(session) => session.run(command),
            None => Err(Error::internal_unexpected(format!(
                "No session for host '{}'",
                key
            ))),
        };
        let finished_at = Utc::now();

        let output = match outcome {
            Ok(output) => output,
            Err(err) => {
                // A broken session must not be reused.
                if let Some(mut session) = self.sessions.remove(&key) {
                    session.close();
                }
                return Err(err);
            }
        };

        let result = ExecutionResult {
            host: host.address.clone(),
            command: command.to_string(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            started_at,
            finished_at,
        };
        self.results.push(result.clone());

        Ok(result)
    }

    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    pub fn take_results(&mut self) -> Vec<ExecutionResult> {
        std::mem::take(&mut self.results)
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn close_all(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.close();
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Logs commands instead of running them.
pub struct DryRunConnector;

impl Connector for DryRunConnector {
    fn connect(&mut self, host: &Host) -> Result<Box<dyn Session>> {
        Ok(Box::new(DryRunSession {
            address: host.address.clone(),
        }))
    }
}

struct DryRunSession {
    address: String,
}

impl Session for DryRunSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        log_status!("dry-run", "{} $ {}", self.address, command);
        Ok(CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            success: true,
            exit_code: 0,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedConnector;
    use super::*;
    use crate::error::ErrorCode;

    fn host(address: &str) -> Host {
        Host::new(address).with_user("libsys")
    }

    #[test]
    fn sessions_are_reused_per_host() {
        let connector = ScriptedConnector::new();
        let mut executor = Executor::new(connector.clone());

        executor.execute(&host("a"), "uptime").unwrap();
        executor.execute(&host("a"), "docker ps").unwrap();
        executor.execute(&host("b"), "uptime").unwrap();

        assert_eq!(connector.connects(), vec!["a", "b"]);
        assert_eq!(executor.open_sessions(), 2);
        assert_eq!(executor.results().len(), 3);
    }

    #[test]
    fn non_zero_exit_is_command_failed() {
        let connector = ScriptedConnector::new();
        connector.fail("a", "docker", 125);
        let mut executor = Executor::new(connector.clone());

        let err = executor.execute(&host("a"), "docker ps").unwrap_err();

        assert_eq!(err.code, ErrorCode::RemoteCommandFailed);
        assert_eq!(err.details["exitCode"], 125);
        assert_eq!(err.details["host"], "a");
        // The failed command still produced a result.
        assert_eq!(executor.results()[0].exit_code, 125);
    }

    #[test]
    fn run_returns_failures_as_results() {
        let connector = ScriptedConnector::new();
        connector.fail("a", "test -d", 1);
        let mut executor = Executor::new(connector);

        let result = executor.run(&host("a"), "test -d /srv").unwrap();
        assert!(!result.success());
    }

    #[test]
    fn unreachable_host_is_connection_error() {
        let connector = ScriptedConnector::new();
        connector.unreachable("a");
        let mut executor = Executor::new(connector.clone());

        let err = executor.execute(&host("a"), "uptime").unwrap_err();

        assert!(err.code.is_connection());
        assert!(connector.calls().is_empty());
        assert_eq!(executor.open_sessions(), 0);
    }

    #[test]
    fn sessions_close_on_drop() {
        let connector = ScriptedConnector::new();
        {
            let mut executor = Executor::new(connector.clone());
            executor.execute(&host("a"), "uptime").unwrap();
            executor.execute(&host("b"), "uptime").unwrap();
        }
        assert_eq!(connector.closes(), 2);
    }

    #[test]
    fn dry_run_always_succeeds() {
        let mut executor = Executor::dry_run();
        let result = executor.execute(&host("a"), "docker stop x").unwrap();

        assert!(result.success());
        assert_eq!(result.command, "docker stop x");
    }
}

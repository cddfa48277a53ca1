use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::executor::{Connector, Session};
use crate::roles::Host;

/// ssh reserves this status for its own (connection-level) failures.
const SSH_CONNECTION_EXIT: i32 = 255;

pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    pub options: Vec<(String, String)>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl SshClient {
    pub fn from_host(host: &Host) -> Result<Self> {
        let user = host
            .user
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::config_missing_key("user", Some(host.address.clone())))?;

        let identity_file = match &host.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(
                        host.address.clone(),
                        expanded,
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&host.address);
        if is_local {
            log_status!("ssh", "Host '{}' is localhost, using local execution", host.address);
        }

        Ok(Self {
            host: host.address.clone(),
            user,
            port: host.port,
            identity_file,
            options: host
                .options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            is_local,
        })
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn base_args(&self, control_path: &Path) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Fail instead of prompting; detect dead peers instead of hanging on
        // a silently dropped connection.
        for option in [
            "BatchMode=yes",
            "ConnectTimeout=10",
            "ServerAliveInterval=15",
            "ServerAliveCountMax=3",
        ] {
            args.push("-o".to_string());
            args.push(option.to_string());
        }

        args.push("-o".to_string());
        args.push(format!("ControlPath={}", control_path.display()));

        for (key, value) in &self.options {
            args.push("-o".to_string());
            args.push(format!("{}={}", key, value));
        }

        args
    }

    /// Start the multiplexing master; later commands ride on its socket.
    fn open_master(&self, control_path: &Path) -> Result<()> {
        let mut args = self.base_args(control_path);
        args.extend([
            "-o".to_string(),
            "ControlMaster=yes".to_string(),
            "-o".to_string(),
            "ControlPersist=yes".to_string(),
            "-f".to_string(),
            "-N".to_string(),
            self.destination(),
        ]);

        let output = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::ssh_connect_failed(self.host.clone(), format!("SSH error: {}", e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Err(classify_connection_error(&self.host, &stderr))
    }

    fn execute(&self, control_path: &Path, command: &str) -> Result<CommandOutput> {
        let mut args = self.base_args(control_path);
        args.extend([
            "-o".to_string(),
            "ControlMaster=no".to_string(),
            self.destination(),
            command.to_string(),
        ]);

        let out = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::ssh_connect_failed(self.host.clone(), format!("SSH error: {}", e)))?;

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        };

        if output.exit_code == SSH_CONNECTION_EXIT {
            return Err(classify_connection_error(&self.host, &output.stderr));
        }

        Ok(output)
    }

    fn close_master(&self, control_path: &Path) {
        let mut args = self.base_args(control_path);
        args.extend(["-O".to_string(), "exit".to_string(), self.destination()]);

        let _ = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

/// Opens one multiplexed OpenSSH connection per host.
pub struct SshConnector {
    control_dir: PathBuf,
}

impl SshConnector {
    pub fn new() -> Result<Self> {
        // Unix sockets have a short path limit, so keep this directory name small.
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let control_dir = std::env::temp_dir().join(format!("stagehand-{}", &run_id[..8]));

        std::fs::create_dir_all(&control_dir).map_err(|e| {
            Error::internal_io(e.to_string(), Some("create ssh control directory".to_string()))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&control_dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| {
                    Error::internal_io(
                        e.to_string(),
                        Some("set ssh control directory permissions".to_string()),
                    )
                })?;
        }

        Ok(Self { control_dir })
    }
}

impl Connector for SshConnector {
    fn connect(&mut self, host: &Host) -> Result<Box<dyn Session>> {
        let client = SshClient::from_host(host)?;

        if client.is_local {
            return Ok(Box::new(LocalSession));
        }

        let control_path = self.control_dir.join("%C");
        log_status!("ssh", "Connecting to {}", client.destination());
        client.open_master(&control_path)?;

        Ok(Box::new(SshSession {
            client,
            control_path,
        }))
    }
}

impl Drop for SshConnector {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.control_dir);
    }
}

pub struct SshSession {
    client: SshClient,
    control_path: PathBuf,
}

impl Session for SshSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        self.client.execute(&self.control_path, command)
    }

    fn close(&mut self) {
        log_status!("ssh", "Closing connection to {}", self.client.destination());
        self.client.close_master(&self.control_path);
    }
}

/// Session for hosts that point at this machine.
pub struct LocalSession;

impl Session for LocalSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        Ok(execute_local_command(command))
    }
}

pub fn execute_local_command(command: &str) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    match cmd.stdin(Stdio::null()).output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput {
            stdout: String::new(),
            stderr: format!("Command error: {}", e),
            success: false,
            exit_code: -1,
        },
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Map ssh's own failure output to an authentication or connection error.
fn classify_connection_error(host: &str, stderr: &str) -> Error {
    let lower = stderr.to_lowercase();

    let auth_patterns = [
        "permission denied",
        "authentication failed",
        "too many authentication failures",
        "host key verification failed",
    ];

    if auth_patterns.iter().any(|p| lower.contains(p)) {
        Error::ssh_auth_failed(host, stderr.trim())
    } else {
        Error::ssh_connect_failed(host, stderr.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn client(host: Host) -> SshClient {
        SshClient::from_host(&host).unwrap()
    }

    #[test]
    fn from_host_requires_user() {
        let err = SshClient::from_host(&Host::new("app1.example.com"))
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::ConfigMissingKey);
    }

    #[test]
    fn missing_identity_file_is_reported() {
        let mut host = Host::new("app1.example.com").with_user("libsys");
        host.identity_file = Some("/nonexistent/stagehand/id_rsa".to_string());

        let err = SshClient::from_host(&host).err().unwrap();
        assert_eq!(err.code, ErrorCode::SshIdentityFileNotFound);
    }

    #[test]
    fn base_args_include_port_control_path_and_options() {
        let mut host = Host::new("app1.example.com")
            .with_user("libsys")
            .with_port(2222);
        host.options
            .insert("StrictHostKeyChecking".to_string(), "no".to_string());

        let args = client(host).base_args(Path::new("/tmp/sh/%C"));

        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert!(args.contains(&"ControlPath=/tmp/sh/%C".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn default_port_is_not_passed() {
        let args = client(Host::new("app1").with_user("libsys")).base_args(Path::new("/tmp/x"));
        assert!(!args.contains(&"-p".to_string()));
    }

    #[test]
    fn localhost_is_local() {
        assert!(client(Host::new("localhost").with_user("me")).is_local);
        assert!(is_local_host("::1"));
        assert!(!is_local_host("app1.example.com"));
    }

    #[test]
    fn auth_failures_are_distinguished() {
        let err = classify_connection_error("app1", "libsys@app1: Permission denied (publickey).");
        assert_eq!(err.code, ErrorCode::SshAuthFailed);

        let err = classify_connection_error("app1", "ssh: connect to host app1 port 22: No route to host");
        assert_eq!(err.code, ErrorCode::SshConnectFailed);
    }

    #[cfg(unix)]
    #[test]
    fn local_session_runs_through_shell() {
        let mut session = LocalSession;
        let output = session.run("echo hello && exit 3").unwrap();

        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.exit_code, 3);
        assert!(!output.success);
    }
}

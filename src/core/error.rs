use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidRecipe,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    RoleNotFound,
    TaskNotFound,
    TaskCycle,
    TaskFailed,

    SshIdentityFileNotFound,
    SshAuthFailed,
    SshConnectFailed,

    RemoteCommandFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidRecipe => "config.invalid_recipe",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::RoleNotFound => "role.not_found",
            ErrorCode::TaskNotFound => "task.not_found",
            ErrorCode::TaskCycle => "task.cycle",
            ErrorCode::TaskFailed => "task.failed",

            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",
            ErrorCode::SshAuthFailed => "ssh.auth_failed",
            ErrorCode::SshConnectFailed => "ssh.connect_failed",

            ErrorCode::RemoteCommandFailed => "remote.command_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// Connection-level failures: the host could not be reached or the
    /// session was lost.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ErrorCode::SshAuthFailed | ErrorCode::SshConnectFailed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidRecipeDetails {
    pub path: String,
    pub format: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub host: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConnectDetails {
    pub host: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshIdentityFileNotFoundDetails {
    pub host: String,
    pub identity_file: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailedDetails {
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub cause: CauseDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CauseDetails {
    pub code: String,
    pub message: String,
    pub details: Value,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
    pub cause: Option<Box<Error>>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
            cause: None,
        }
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn role_not_found(id: impl Into<String>, available: Vec<String>) -> Self {
        let id = id.into();
        Self::not_found(
            ErrorCode::RoleNotFound,
            format!("Role '{}' is not defined", id),
            id,
            available,
        )
        .with_hint("Run 'stagehand roles' to see configured roles")
    }

    pub fn task_not_found(id: impl Into<String>, available: Vec<String>) -> Self {
        let id = id.into();
        Self::not_found(
            ErrorCode::TaskNotFound,
            format!("Task '{}' is not defined", id),
            id,
            available,
        )
        .with_hint("Run 'stagehand tasks' to see available tasks")
    }

    fn not_found(
        code: ErrorCode,
        message: String,
        id: String,
        available: Vec<String>,
    ) -> Self {
        Self::new(code, message, to_details(NotFoundDetails { id, available }))
    }

    pub fn task_cycle(stack: Vec<String>) -> Self {
        let chain = stack.join(" -> ");
        Self::new(
            ErrorCode::TaskCycle,
            format!("Task invocation cycle: {}", chain),
            serde_json::json!({ "stack": stack }),
        )
    }

    /// Wrap a failure raised while running `task` (on `host`, when the
    /// failure happened inside a host iteration).
    pub fn task_failed(task: impl Into<String>, host: Option<String>, cause: Error) -> Self {
        let task = task.into();
        let message = match &host {
            Some(h) => format!("Task '{}' failed on host '{}': {}", task, h, cause.message),
            None => format!("Task '{}' failed: {}", task, cause.message),
        };
        let details = to_details(TaskFailedDetails {
            task,
            host,
            cause: CauseDetails {
                code: cause.code.as_str().to_string(),
                message: cause.message.clone(),
                details: cause.details.clone(),
            },
        });

        let mut err = Self::new(ErrorCode::TaskFailed, message, details);
        err.hints = cause.hints.clone();
        err.retryable = cause.retryable;
        err.cause = Some(Box::new(cause));
        err
    }

    pub fn ssh_connect_failed(host: impl Into<String>, error: impl Into<String>) -> Self {
        let host = host.into();
        let message = format!("Could not connect to '{}'", host);
        let mut err = Self::new(
            ErrorCode::SshConnectFailed,
            message,
            to_details(SshConnectDetails {
                host,
                error: error.into(),
            }),
        );
        err.retryable = Some(true);
        err
    }

    pub fn ssh_auth_failed(host: impl Into<String>, error: impl Into<String>) -> Self {
        let host = host.into();
        let message = format!("Authentication to '{}' was rejected", host);
        Self::new(
            ErrorCode::SshAuthFailed,
            message,
            to_details(SshConnectDetails {
                host,
                error: error.into(),
            }),
        )
        .with_hint("Check the host's user and identityFile in the recipe")
    }

    pub fn ssh_identity_file_not_found(
        host: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        let details = to_details(SshIdentityFileNotFoundDetails {
            host: host.into(),
            identity_file: identity_file.into(),
        });

        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            details,
        )
    }

    pub fn remote_command_failed(details: RemoteCommandFailedDetails) -> Self {
        let message = format!(
            "Command '{}' exited with status {}",
            details.command, details.exit_code
        );
        Self::new(ErrorCode::RemoteCommandFailed, message, to_details(details))
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        let message = format!("Missing required configuration key '{}'", key);
        let details = to_details(ConfigMissingKeyDetails {
            key: key.clone(),
            path,
        });

        Self::new(ErrorCode::ConfigMissingKey, message, details).with_hint(format!(
            "Set it in the recipe or pass --set {}=<value>",
            key
        ))
    }

    pub fn config_invalid_recipe(
        path: impl Into<String>,
        format: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidRecipeDetails {
            path: path.into(),
            format: format.into(),
            error: error.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidRecipe,
            "Invalid recipe file",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Innermost error of a `task.failed` chain.
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Some(cause) = current.cause.as_deref() {
            current = cause;
        }
        current
    }

    /// Exit status of the failing remote command, when the chain ends in one.
    pub fn remote_exit_code(&self) -> Option<i32> {
        let root = self.root_cause();
        if root.code != ErrorCode::RemoteCommandFailed {
            return None;
        }
        root.details.get("exitCode")?.as_i64().map(|code| code as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_failure(exit_code: i32) -> Error {
        Error::remote_command_failed(RemoteCommandFailedDetails {
            command: "docker ps".to_string(),
            exit_code,
            stdout: String::new(),
            stderr: "boom".to_string(),
            host: "app1".to_string(),
        })
    }

    #[test]
    fn task_failed_names_task_host_and_cause() {
        let err = Error::task_failed("airflow:ps", Some("app1".to_string()), command_failure(3));

        assert_eq!(err.code, ErrorCode::TaskFailed);
        assert!(err.message.contains("airflow:ps"));
        assert!(err.message.contains("app1"));
        assert_eq!(err.details["cause"]["code"], "remote.command_failed");
        assert_eq!(err.details["host"], "app1");
    }

    #[test]
    fn remote_exit_code_walks_nested_causes() {
        let inner = Error::task_failed("airflow:stop", Some("app1".to_string()), command_failure(7));
        let outer = Error::task_failed("airflow:restart", None, inner);

        assert_eq!(outer.root_cause().code, ErrorCode::RemoteCommandFailed);
        assert_eq!(outer.remote_exit_code(), Some(7));
    }

    #[test]
    fn remote_exit_code_absent_for_connection_errors() {
        let err = Error::task_failed(
            "airflow:ps",
            Some("app1".to_string()),
            Error::ssh_connect_failed("app1", "no route to host"),
        );

        assert_eq!(err.remote_exit_code(), None);
        assert!(err.root_cause().code.is_connection());
    }

    #[test]
    fn only_unreachable_hosts_are_retryable() {
        let unreachable = Error::task_failed(
            "airflow:ps",
            Some("app1".to_string()),
            Error::ssh_connect_failed("app1", "no route to host"),
        );
        assert_eq!(unreachable.retryable, Some(true));

        let failed = Error::task_failed("airflow:ps", Some("app1".to_string()), command_failure(1));
        assert_eq!(failed.retryable, None);
        assert_eq!(Error::ssh_auth_failed("app1", "denied").retryable, None);
    }
}

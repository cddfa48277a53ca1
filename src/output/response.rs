//! CLI response formatting and output.
//!
//! Provides JSON envelope, printing, and exit code mapping.

use stagehand::error::Hint;
use stagehand::{Error, ErrorCode, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Hint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl<T: Serialize> CliResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize response".to_string()))
        })
    }
}

impl CliResponse<()> {
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CliError {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
                hints: if err.hints.is_empty() {
                    None
                } else {
                    Some(err.hints.clone())
                },
                retryable: err.retryable,
            }),
        }
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) -> Result<()> {
    use std::io::{self, Write};

    let payload = response.to_json()?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", payload) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            return Ok(()); // Exit gracefully on SIGPIPE
        }
        return Err(Error::internal_io(
            e.to_string(),
            Some("write stdout".to_string()),
        ));
    }
    Ok(())
}

pub fn print_success<T: Serialize>(data: T) -> Result<()> {
    print_response(&CliResponse::success(data))
}

pub fn map_cmd_result_to_json<T: Serialize>(
    result: Result<(T, i32)>,
) -> (Result<serde_json::Value>, i32) {
    match result {
        Ok((data, exit_code)) => match serde_json::to_value(data) {
            Ok(value) => (Ok(value), exit_code),
            Err(err) => (
                Err(Error::internal_json(
                    err.to_string(),
                    Some("serialize response".to_string()),
                )),
                1,
            ),
        },
        Err(err) => {
            let exit_code = exit_code_for(&err);
            (Err(err), exit_code)
        }
    }
}

/// A failed remote command surfaces its own exit status; everything else
/// maps to a category code.
pub fn exit_code_for(err: &Error) -> i32 {
    match err.remote_exit_code() {
        Some(code) => code.clamp(1, 255),
        None => exit_code_for_error(err.root_cause().code),
    }
}

fn exit_code_for_error(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::ConfigMissingKey
        | ErrorCode::ConfigInvalidRecipe
        | ErrorCode::ConfigInvalidValue
        | ErrorCode::ValidationInvalidArgument
        | ErrorCode::TaskCycle => 2,

        ErrorCode::RoleNotFound | ErrorCode::TaskNotFound => 4,

        ErrorCode::SshIdentityFileNotFound
        | ErrorCode::SshAuthFailed
        | ErrorCode::SshConnectFailed => 10,

        ErrorCode::RemoteCommandFailed | ErrorCode::TaskFailed => 20,

        ErrorCode::InternalIoError
        | ErrorCode::InternalJsonError
        | ErrorCode::InternalUnexpected => 1,
    }
}

pub fn print_json_result(result: Result<serde_json::Value>) -> Result<()> {
    match result {
        Ok(data) => print_success(data),
        Err(err) => print_response(&CliResponse::<()>::from_error(&err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand::error::RemoteCommandFailedDetails;

    fn command_failed(exit_code: i32) -> Error {
        Error::remote_command_failed(RemoteCommandFailedDetails {
            command: "docker ps".to_string(),
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            host: "app1".to_string(),
        })
    }

    #[test]
    fn remote_exit_code_passes_through_task_failure() {
        let err = Error::task_failed("airflow:ps", Some("app1".to_string()), command_failed(125));
        assert_eq!(exit_code_for(&err), 125);
    }

    #[test]
    fn out_of_range_remote_codes_are_clamped() {
        assert_eq!(exit_code_for(&command_failed(-1)), 1);
        assert_eq!(exit_code_for(&command_failed(300)), 255);
    }

    #[test]
    fn category_codes_follow_root_cause() {
        let unreachable = Error::ssh_connect_failed("app1", "No route to host");
        let err = Error::task_failed("airflow:ps", Some("app1".to_string()), unreachable);
        assert_eq!(exit_code_for(&err), 10);

        let err = Error::task_not_found("nope", vec![]);
        assert_eq!(exit_code_for(&err), 4);
    }

    #[test]
    fn connection_failures_are_marked_retryable() {
        let err = Error::ssh_connect_failed("app1", "No route to host");
        let json = serde_json::to_value(CliResponse::<()>::from_error(&err)).unwrap();

        assert_eq!(json["error"]["retryable"], true);
    }

    #[test]
    fn error_envelope_carries_code_and_details() {
        let err = Error::role_not_found("db", vec!["app".to_string()]);
        let response = CliResponse::<()>::from_error(&err);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "role.not_found");
        assert_eq!(json["error"]["details"]["available"][0], "app");
    }
}

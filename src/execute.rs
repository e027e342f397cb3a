//! Runs code on an interactive cluster through a reusable execution context.

use std::time::Duration;

use serde_json::{json, Value};

use crate::api::Transport;
use crate::api::v1::ApiV1Client;
use crate::echo::echo;
use crate::error::{DbxError, DbxResult};
use crate::project::LockFile;

const CONTEXT_RUNNING: &str = "Running";
const LANGUAGE: &str = "python";

/// Terminal command states reported by `/commands/status`.
const TERMINAL_STATES: [&str; 3] = ["Finished", "Cancelled", "Error"];

fn string_field(value: &Value, key: &str) -> DbxResult<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DbxError::UnexpectedResponse(format!("{key} missing")))
}

/// Id of a running context on `cluster_id`, reusing the locked one when possible.
pub async fn ensure_context<T: Transport>(
    v1: &ApiV1Client<T>,
    lock: &LockFile,
    cluster_id: &str,
) -> DbxResult<String> {
    if let Some(context_id) = lock.get_context()? {
        let status = v1
            .get_context_status(json!({ "clusterId": cluster_id, "contextId": context_id }))
            .await?;
        let running = status
            .as_ref()
            .and_then(|s| s.get("status"))
            .and_then(Value::as_str)
            == Some(CONTEXT_RUNNING);
        if running {
            echo(format!("Reusing existing execution context {context_id}"));
            return Ok(context_id);
        }
        tracing::debug!(%context_id, "locked context is not running");
    }

    echo("Creating a new execution context");
    let created = v1
        .create_context(json!({ "language": LANGUAGE, "clusterId": cluster_id }))
        .await?;
    let context_id = string_field(&created, "id")?;
    lock.set_context(&context_id)?;
    echo(format!("New execution context {context_id} is ready"));
    Ok(context_id)
}

pub async fn submit_command<T: Transport>(
    v1: &ApiV1Client<T>,
    cluster_id: &str,
    context_id: &str,
    command: &str,
) -> DbxResult<String> {
    let submitted = v1
        .execute_command(json!({
            "language": LANGUAGE,
            "clusterId": cluster_id,
            "contextId": context_id,
            "command": command,
        }))
        .await?;
    string_field(&submitted, "id")
}

/// Polls until the command reaches a terminal state and returns its final
/// status payload. An error result is surfaced as [`DbxError::CommandFailed`].
pub async fn wait_for_command<T: Transport>(
    v1: &ApiV1Client<T>,
    cluster_id: &str,
    context_id: &str,
    command_id: &str,
    poll_interval: Duration,
) -> DbxResult<Value> {
    let payload = json!({
        "clusterId": cluster_id,
        "contextId": context_id,
        "commandId": command_id,
    });

    loop {
        let status = v1.get_command_status(payload.clone()).await?;
        let state = string_field(&status, "status")?;
        tracing::debug!(%command_id, %state, "command status");

        if TERMINAL_STATES.contains(&state.as_str()) {
            let results = status.get("results");
            let result_type = results
                .and_then(|r| r.get("resultType"))
                .and_then(Value::as_str);
            if state != "Finished" || result_type == Some("error") {
                let cause = results
                    .and_then(|r| r.get("cause").or_else(|| r.get("summary")))
                    .and_then(Value::as_str)
                    .unwrap_or("no details reported")
                    .to_string();
                return Err(DbxError::CommandFailed {
                    command_id: command_id.to_string(),
                    status: state,
                    cause,
                });
            }
            return Ok(status);
        }

        tokio::time::sleep(poll_interval).await;
    }
}

pub async fn cancel_command<T: Transport>(
    v1: &ApiV1Client<T>,
    cluster_id: &str,
    context_id: &str,
    command_id: &str,
) -> DbxResult<()> {
    echo(format!("Cancelling command {command_id}"));
    v1.cancel_command(json!({
        "clusterId": cluster_id,
        "contextId": context_id,
        "commandId": command_id,
    }))
    .await?;
    Ok(())
}

/// Text output of a finished command, if it produced any.
pub fn command_output(status: &Value) -> Option<&str> {
    status
        .get("results")
        .and_then(|r| r.get("data"))
        .and_then(Value::as_str)
}

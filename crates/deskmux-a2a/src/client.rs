//! Single and fan-out HTTP invocation of specialist workers.
//!
//! Key property: **never raises**. Every failure path — timeout, connect
//! failure, non-2xx, a `status=failed` result, or a decode error — is
//! converted into a descriptive string. Callers get a string describing
//! either the result or the failure, always.

use std::collections::HashMap;
use std::time::Duration;

use crate::types::{Task, TaskResult};

/// Invoke one worker. Builds a [`Task`], POSTs it to `{endpoint}/a2a`, and
/// reduces every outcome to a string.
pub async fn call(client: &reqwest::Client, endpoint: &str, query: &str, timeout: Duration, session_id: Option<&str>) -> String {
    let task = Task::new(query, session_id.map(|s| s.to_string()));
    let url = format!("{endpoint}/a2a");

    let response = client.post(&url).timeout(timeout).json(&task).send().await;

    let response = match response {
        Ok(r) => r,
        Err(e) if e.is_timeout() => {
            return format!("Agent at {endpoint} timed out after {}s.", timeout.as_secs());
        }
        Err(e) if e.is_connect() => {
            return format!("Agent at {endpoint} is unreachable. Check that the service is running.");
        }
        Err(e) => {
            return format!("A2A call to {endpoint} failed: {e}");
        }
    };

    let result: Result<TaskResult, reqwest::Error> = response.json().await;
    let result = match result {
        Ok(r) => r,
        Err(e) => return format!("A2A call to {endpoint} failed: {e}"),
    };

    match result.status {
        crate::types::ResultStatus::Failed => {
            format!("Agent at {endpoint} returned error: {}", result.error.unwrap_or_default())
        }
        crate::types::ResultStatus::Completed => match result.first_text() {
            Some(text) => text.to_string(),
            None => "Agent returned no output.".to_string(),
        },
    }
}

/// Resolves a worker id to the endpoint that should receive the call (the
/// registry lookup, with a per-worker fallback URL). Kept as a plain
/// function argument rather than a trait so this crate has no dependency
/// on the registry's storage choice.
pub type Resolver<'a> = dyn Fn(&str) -> String + Send + Sync + 'a;

/// Invoke all `ids` concurrently under one shared deadline. Partial success
/// is the norm: one slow or broken worker never blocks or fails the group.
/// Returns a map keyed by input id; values are either success text or an
/// error string from [`call`].
pub async fn call_all(
    client: &reqwest::Client,
    ids: &[String],
    query: &str,
    timeout: Duration,
    session_id: Option<&str>,
    resolve: &Resolver<'_>,
) -> HashMap<String, String> {
    let futures = ids.iter().map(|id| {
        let endpoint = resolve(id);
        let id = id.clone();
        async move {
            let text = call(client, &endpoint, query, timeout, session_id).await;
            (id, text)
        }
    });

    futures::future::join_all(futures).await.into_iter().collect()
}

//! OpenAI-compatible `/v1/chat/completions` handler.

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};

use deskmux_pipeline::PipelineDeps;
use deskmux_session::SessionStore;

use crate::persistence::{self, PersistJob};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default = "default_model")]
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub desk_name: String,
}

fn default_model() -> String {
    "agentic-ai-system".to_string()
}

#[derive(Debug, Serialize)]
pub struct ChatChoiceMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatChoiceMessage,
    pub finish_reason: String,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub session_id: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

fn chat_completion_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("chatcmpl-{}", &hex[..8])
}

fn approx_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Resolve (or mint) the session id for this request, and render its prior
/// turns as a context block to prepend to the query.
fn resolve_session(sessions: &SessionStore, req: &ChatRequest) -> (String, String) {
    let session_id = match &req.session_id {
        Some(id) if !id.is_empty() => id.clone(),
        _ => sessions.create(&req.user, &req.desk_name),
    };
    let history = sessions.load(&session_id);
    let context = SessionStore::render_context(&history);
    (session_id, context)
}

fn enrich_query(user_text: &str, context: &str) -> String {
    if context.is_empty() {
        user_text.to_string()
    } else {
        format!("{context}\n\n{user_text}")
    }
}

pub async fn handler(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let (session_id, context) = resolve_session(&state.sessions, &req);

    let user_text = req.messages.iter().rev().find(|m| m.role == "user").map(|m| m.content.clone());

    let Some(user_text) = user_text else {
        let response = ChatResponse {
            id: chat_completion_id(),
            object: "chat.completion".to_string(),
            created: deskmux_session::unix_now(),
            model: req.model.clone(),
            session_id,
            choices: vec![ChatChoice {
                index: 0,
                message: ChatChoiceMessage {
                    role: "assistant".to_string(),
                    content: "No user message found.".to_string(),
                },
                finish_reason: "stop".to_string(),
            }],
            usage: Usage { prompt_tokens: 0, completion_tokens: 0, total_tokens: 0 },
        };
        return Json(response).into_response();
    };

    let enriched_query = enrich_query(&user_text, &context);

    let final_response = run_pipeline(&state, enriched_query, session_id.clone()).await;

    persistence::enqueue(
        &state.persist_tx,
        PersistJob {
            session_id: session_id.clone(),
            user_text: user_text.clone(),
            assistant_text: final_response.clone(),
            user_id: req.user.clone(),
            desk_name: req.desk_name.clone(),
        },
    );

    if req.stream == Some(true) {
        return stream_response(req.model, session_id, final_response).into_response();
    }

    let response = ChatResponse {
        id: chat_completion_id(),
        object: "chat.completion".to_string(),
        created: deskmux_session::unix_now(),
        model: req.model,
        session_id,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatChoiceMessage { role: "assistant".to_string(), content: final_response.clone() },
            finish_reason: "stop".to_string(),
        }],
        usage: Usage {
            prompt_tokens: approx_tokens(&user_text),
            completion_tokens: approx_tokens(&final_response),
            total_tokens: approx_tokens(&user_text) + approx_tokens(&final_response),
        },
    };

    Json(response).into_response()
}

async fn run_pipeline(state: &AppState, query: String, session_id: String) -> String {
    let _permit = state.pipeline_semaphore.acquire().await.expect("semaphore never closed");

    let resolve = state.resolver();
    let deps = PipelineDeps {
        retriever: &state.retriever,
        llm: state.llm.as_ref(),
        http_client: &state.http_client,
        resolve: &*resolve,
        a2a_timeout: state.config.a2a_timeout(),
        registered_ids: state.registered_ids(),
        rag_top_k: state.config.rag.top_k,
    };

    let pipeline_state = deskmux_pipeline::run(query, Some(session_id), &deps).await;
    pipeline_state.final_response.unwrap_or_else(|| "Error: no response produced.".to_string())
}

fn stream_response(model: String, session_id: String, final_response: String) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let tokens: Vec<String> = final_response.split_whitespace().map(|t| t.to_string()).collect();
    let created = deskmux_session::unix_now();
    let id = chat_completion_id();

    let mut events = Vec::with_capacity(tokens.len() + 3);

    events.push(sse_chunk(&id, created, &model, &session_id, Some("assistant"), None, None));

    for token in &tokens {
        events.push(sse_chunk(&id, created, &model, &session_id, None, Some(format!("{token} ")), None));
    }

    events.push(sse_chunk(&id, created, &model, &session_id, None, None, Some("stop")));

    let with_sentinel = events.into_iter().map(Ok).chain(std::iter::once(Ok(Event::default().data("[DONE]"))));
    Sse::new(stream::iter(with_sentinel))
}

fn sse_chunk(
    id: &str,
    created: i64,
    model: &str,
    session_id: &str,
    role: Option<&str>,
    content: Option<String>,
    finish_reason: Option<&str>,
) -> Event {
    let mut delta = serde_json::Map::new();
    if let Some(role) = role {
        delta.insert("role".to_string(), serde_json::Value::String(role.to_string()));
    }
    if let Some(content) = content {
        delta.insert("content".to_string(), serde_json::Value::String(content));
    }

    let chunk = serde_json::json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "session_id": session_id,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }],
    });

    Event::default().json_data(chunk).unwrap_or_else(|_| Event::default().data("{}"))
}

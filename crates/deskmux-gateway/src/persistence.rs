//! Fire-and-forget session persistence.
//!
//! The chat handler must never block its response on a session-store write.
//! A bounded channel decouples the two: a full queue means writes are
//! dropped rather than the request stalling — a degraded history is
//! preferable to a slow response.

use deskmux_session::SessionStore;
use tokio::sync::mpsc;

pub struct PersistJob {
    pub session_id: String,
    pub user_text: String,
    pub assistant_text: String,
    pub user_id: String,
    pub desk_name: String,
}

/// Spawn the background drain task and return a sender. Capacity bounds how
/// many in-flight turns can queue before the policy kicks in.
pub fn spawn(sessions: SessionStore, capacity: usize) -> mpsc::Sender<PersistJob> {
    let (tx, mut rx) = mpsc::channel(capacity);

    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            sessions.append(&job.session_id, &job.user_text, &job.assistant_text, &job.user_id, &job.desk_name);
        }
    });

    tx
}

/// Enqueue a turn without awaiting. Drops silently (with a debug log) if the
/// queue is full — this is the documented drop-on-overflow policy, not a
/// bug.
pub fn enqueue(tx: &mpsc::Sender<PersistJob>, job: PersistJob) {
    if let Err(e) = tx.try_send(job) {
        tracing::debug!(error = %e, "persistence queue full, dropping turn");
    }
}

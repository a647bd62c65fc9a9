use std::collections::HashMap;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;
use uuid::Uuid;

use crate::types::{ProgressEvent, ProgressStatus};

struct ProgressChannel {
    tx: broadcast::Sender<ProgressEvent>,
    next_seq: u64,
}

/// One bounded publish/subscribe channel per session id. Sequence numbers
/// are assigned here, under the session's single writer, so every listener
/// observes them in strictly increasing order. Late subscribers get no
/// replay, but a terminal event reached after attachment is still seen.
pub struct ProgressBroadcaster {
    channels: HashMap<Uuid, ProgressChannel>,
    backlog: usize,
}

impl ProgressBroadcaster {
    pub fn new(backlog: usize) -> Self {
        Self {
            channels: HashMap::new(),
            backlog,
        }
    }

    pub fn register(&mut self, session_id: Uuid) {
        self.channels.entry(session_id).or_insert_with(|| {
            let (tx, _) = broadcast::channel(self.backlog);
            ProgressChannel { tx, next_seq: 0 }
        });
    }

    pub fn subscribe(&self, session_id: Uuid) -> Option<BroadcastStream<ProgressEvent>> {
        self.channels
            .get(&session_id)
            .map(|channel| BroadcastStream::new(channel.tx.subscribe()))
    }

    /// Publish one event; returns it (with its assigned sequence number)
    /// for callers that also log or store it. Publishing without listeners
    /// is fine — progress is best-effort by design.
    pub fn publish(
        &mut self,
        session_id: Uuid,
        status: ProgressStatus,
        progress: f32,
        message: impl Into<String>,
        candidate_count: usize,
    ) -> Option<ProgressEvent> {
        let channel = self.channels.get_mut(&session_id)?;
        let event = ProgressEvent {
            session_id,
            seq: channel.next_seq,
            status,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            candidate_count,
        };
        channel.next_seq += 1;
        trace!(session = %session_id, seq = event.seq, "progress: {}", event.message);
        let _ = channel.tx.send(event.clone());
        Some(event)
    }

    /// Drop a session's channel once its terminal event went out and the
    /// session itself is gone.
    pub fn remove(&mut self, session_id: Uuid) {
        self.channels.remove(&session_id);
    }
}

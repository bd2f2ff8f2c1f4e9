use crate::cache::CacheKey;
use crate::error::SynthesisError;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

pub type BoxEventStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

const DEFAULT_EVENT_BUFFER: usize = 256;

/// Out-of-band notifications about absorbed errors and request outcomes
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A cache operation failed and was bypassed
    CacheError {
        operation: String,
        key: Option<CacheKey>,
        message: String,
    },
    /// One synthesis attempt failed; the request may still be retried
    BackendFailed {
        backend: String,
        attempt: u32,
        message: String,
    },
    RequestCompleted {
        key: CacheKey,
        backend: String,
        cached: bool,
    },
    RequestFailed {
        key: CacheKey,
        error: SynthesisError,
    },
}

/// Broadcast fan-out of [`OrchestratorEvent`]s
///
/// Emitting never blocks; slow subscribers drop the events they lagged on.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: OrchestratorEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> BoxEventStream<OrchestratorEvent> {
        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(
            |item: Result<OrchestratorEvent, BroadcastStreamRecvError>| async move { item.ok() },
        );
        Box::pin(stream)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

//! Build events.
//!
//! A broadcast channel shared by the builder and every stage. Publishing
//! with no subscribers is fine; the event is dropped.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum BuildEvent {
    #[serde(rename = "stage:complete")]
    StageComplete { name: String, result: Value },
    #[serde(rename = "asset:copied")]
    AssetCopied {
        source: String,
        dest: String,
        #[serde(rename = "type")]
        kind: String,
    },
    #[serde(rename = "css:generated")]
    CssGenerated { path: String, size: usize },
}

impl BuildEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BuildEvent::StageComplete { .. } => "stage:complete",
            BuildEvent::AssetCopied { .. } => "asset:copied",
            BuildEvent::CssGenerated { .. } => "css:generated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BuildEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; returns how many subscribers received it.
    pub fn emit(&self, event: BuildEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Log every event until the bus is dropped.
    pub fn spawn_logger(&self) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(BuildEvent::StageComplete { name, .. }) => {
                        log::info!("stage `{}` complete", name);
                    }
                    Ok(event @ BuildEvent::AssetCopied { .. }) => {
                        log::debug!("{}: {:?}", event.name(), event);
                    }
                    Ok(BuildEvent::CssGenerated { path, size }) => {
                        log::info!("wrote {} ({} bytes)", path, size);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("event logger skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

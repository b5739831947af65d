//! Subscription handles
//!
//! A subscription owns a dedicated pub/sub connection. A background task
//! reads it and forwards every message into a bounded channel; closing or
//! dropping the [`Subscription`] stops that task and closes the connection.

use futures::StreamExt;
use redis::aio::PubSub;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Buffered messages per subscription before the reader waits
pub const SUBSCRIPTION_BUFFER: usize = 128;

/// A message delivered to a subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub channel: String,
    /// Matching pattern, for pattern subscriptions
    pub pattern: Option<String>,
    pub payload: String,
}

/// Live subscription to one or more channels or patterns
#[derive(Debug)]
pub struct Subscription {
    targets: Vec<String>,
    receiver: mpsc::Receiver<Message>,
    reader: JoinHandle<()>,
}

impl Subscription {
    /// Start forwarding messages from an already subscribed connection.
    pub(crate) fn spawn(pubsub: PubSub, targets: Vec<String>) -> Self {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let label = targets.join(",");

        let reader = tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                let payload = match msg.get_payload::<String>() {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!(channel = msg.get_channel_name(), error = %e, "dropping undecodable message");
                        continue;
                    }
                };
                let message = Message {
                    channel: msg.get_channel_name().to_string(),
                    pattern: msg.get_pattern::<Option<String>>().ok().flatten(),
                    payload,
                };
                if sender.send(message).await.is_err() {
                    break;
                }
            }
            debug!(targets = %label, "subscription reader stopped");
        });

        Self {
            targets,
            receiver,
            reader,
        }
    }

    /// Channels or patterns this subscription listens to
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Next message; `None` once the connection closed
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }

    /// The underlying message channel
    pub fn receiver(&mut self) -> &mut mpsc::Receiver<Message> {
        &mut self.receiver
    }

    /// Stop the reader and release the connection
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.reader.abort();
        self.receiver.close();
    }
}

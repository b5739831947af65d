use async_trait::async_trait;

use super::require_args;
use crate::backend::Backend;
use crate::client::PubSubCommands;
use crate::error::CacheResult;
use crate::pubsub::Subscription;
use crate::topology::{Access, Topology};

const SUBSCRIBE: &str = "SUBSCRIBE";
const PSUBSCRIBE: &str = "PSUBSCRIBE";
const PUBLISH: &str = "PUBLISH";

#[derive(Clone, Copy)]
enum Target {
    Channels,
    Patterns,
}

impl<T: Topology> Backend<T> {
    async fn open_subscription(&self, target: Target, names: &[&str]) -> CacheResult<Subscription> {
        let op = match target {
            Target::Channels => SUBSCRIBE,
            Target::Patterns => PSUBSCRIBE,
        };
        require_args(op, names)?;
        let shared = &self.shared;
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();

        shared
            .traced(op, names.first().map(String::as_str), Access::Write, async {
                let mut pubsub = shared.topology.pubsub().await?;
                let subscribed = match target {
                    Target::Channels => pubsub.subscribe(&names).await,
                    Target::Patterns => pubsub.psubscribe(&names).await,
                };
                subscribed.map_err(|e| shared.classify(op, Access::Write, e))?;
                Ok(Subscription::spawn(pubsub, names.clone()))
            })
            .await
    }
}

#[async_trait]
impl<T: Topology> PubSubCommands for Backend<T> {
    async fn subscribe(&self, channels: &[&str]) -> CacheResult<Subscription> {
        self.open_subscription(Target::Channels, channels).await
    }

    async fn psubscribe(&self, patterns: &[&str]) -> CacheResult<Subscription> {
        self.open_subscription(Target::Patterns, patterns).await
    }

    async fn publish(&self, channel: &str, message: &str) -> CacheResult<u64> {
        self.run(
            PUBLISH,
            Some(channel),
            Access::Write,
            redis::cmd("PUBLISH").arg(channel).arg(message),
        )
        .await
    }
}

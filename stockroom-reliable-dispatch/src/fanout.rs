use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stockroom_core::event::{Delivery, DeliveryTag, Event};
use stockroom_core::EventSink;
use tracing::warn;

use crate::errors::{ReliableDispatchError, Result};

/// Publishes every event to all configured sinks.
///
/// Consumption (`receive`, `acknowledge`, `abandon`) goes through the primary
/// sink, the first one in the list; the others are publish-only from here.
pub struct FanoutSink {
    sinks: Vec<(String, Arc<dyn EventSink>)>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<(String, Arc<dyn EventSink>)>) -> Result<Self> {
        if sinks.is_empty() {
            return Err(ReliableDispatchError::InvalidState(
                "fanout requires at least one sink".to_string(),
            ));
        }
        Ok(FanoutSink { sinks })
    }

    fn primary(&self) -> &Arc<dyn EventSink> {
        &self.sinks[0].1
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|(name, _)| name.as_str()).collect()
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    /// Succeeds if at least one sink accepted the event.
    async fn publish(&self, event: &Event) -> stockroom_core::Result<()> {
        let mut failures = Vec::new();
        for (name, sink) in &self.sinks {
            if let Err(e) = sink.publish(event).await {
                warn!("publish to {} failed: {}", name, e);
                failures.push(format!("{}: {}", name, e));
            }
        }
        if failures.len() == self.sinks.len() {
            return Err(ReliableDispatchError::FanoutFailed(failures.join("; ")).into());
        }
        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> stockroom_core::Result<Vec<Delivery>> {
        self.primary().receive(max, wait).await
    }

    async fn acknowledge(&self, tag: DeliveryTag) -> stockroom_core::Result<()> {
        self.primary().acknowledge(tag).await
    }

    async fn abandon(&self, tag: DeliveryTag) -> stockroom_core::Result<()> {
        self.primary().abandon(tag).await
    }

    /// Closes every sink, reporting the first failure after trying them all.
    async fn close(&self) -> stockroom_core::Result<()> {
        let mut first_err = None;
        for (name, sink) in &self.sinks {
            if let Err(e) = sink.close().await {
                warn!("closing {} failed: {}", name, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

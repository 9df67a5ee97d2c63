use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::broker::Broker;
use crate::error::BrokerResult;
use crate::message::Delivery;
use crate::queue::Queue;

/// Implemented once per consumer (sync/eval/impl); `handle` runs to
/// completion before the delivery is ack'd.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, delivery: &Delivery) -> anyhow::Result<()>;
}

/// Runs one cooperative, single-I/O-multiplexed loop per queue.
/// Deliveries within a poll batch are processed sequentially; separate
/// queues/processes run independently and in parallel.
pub struct Consumer<H: Handler> {
    broker: Broker,
    queue: Queue,
    handler: H,
    poll_interval: Duration,
}

impl<H: Handler> Consumer<H> {
    pub fn new(broker: Broker, queue: Queue, handler: H) -> Self {
        Self {
            broker,
            queue,
            handler,
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn run(&self, shutdown: &mut tokio::sync::watch::Receiver<bool>) -> BrokerResult<()> {
        info!(queue = %self.queue, "consumer starting");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(queue = %self.queue, "consumer stopping");
                        return Ok(());
                    }
                }
                _ = self.poll_once() => {}
            }
        }
    }

    async fn poll_once(&self) {
        match self.broker.consume(self.queue, self.queue.prefetch()).await {
            Ok(deliveries) if deliveries.is_empty() => {
                tokio::time::sleep(self.poll_interval).await;
            }
            Ok(deliveries) => {
                for delivery in &deliveries {
                    match self.handler.handle(delivery).await {
                        Ok(()) => {
                            if let Err(e) = self.broker.ack(delivery.id).await {
                                error!(error = %e, id = %delivery.id, "failed to ack delivery");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, id = %delivery.id, queue = %self.queue, "handler failed, nacking");
                            if let Err(e) = self.broker.nack(delivery.id).await {
                                error!(error = %e, id = %delivery.id, "failed to nack delivery");
                            }
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, queue = %self.queue, "poll failed");
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }
}

//! In-process publish/subscribe for ledger outcomes.
//!
//! Subscribers are registered once at startup and invoked sequentially in
//! registration order; `publish` returns after all of them ran. A failing
//! subscriber is logged and skipped, it never fails the publisher.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{ObjectId, PaymentTransaction};
use crate::error::Result;
use crate::service::{
    earning_calculator::EarningCalculator, notification_trigger::NotificationTrigger,
    order_creator::OrderCreator, subscription_sync::SubscriptionSynchronizer, ServiceContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Transactions,
}

#[derive(Debug, Clone)]
pub enum LedgerEvent {
    /// A transaction reached `success`. `renewal` marks rows created for a
    /// provider rebill.
    TransactionSucceeded {
        transaction: PaymentTransaction,
        renewal: bool,
    },
    SubscriptionCancelled {
        performer_id: ObjectId,
        user_id: ObjectId,
        transaction_id: Option<ObjectId>,
    },
}

impl LedgerEvent {
    pub fn channel(&self) -> Channel {
        Channel::Transactions
    }

    fn label(&self) -> String {
        match self {
            LedgerEvent::TransactionSucceeded { transaction, .. } => {
                format!("transaction {} succeeded", transaction.id)
            }
            LedgerEvent::SubscriptionCancelled { performer_id, user_id, .. } => {
                format!("subscription {}/{} cancelled", performer_id, user_id)
            }
        }
    }
}

#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, event: &LedgerEvent) -> Result<()>;
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<Channel, Vec<Arc<dyn EventSubscriber>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, channel: Channel, subscriber: Arc<dyn EventSubscriber>) {
        tracing::info!("Subscribed {} to {:?}", subscriber.name(), channel);
        self.subscribers
            .write()
            .await
            .entry(channel)
            .or_default()
            .push(subscriber);
    }

    /// Names of subscribers on `channel`, in dispatch order.
    pub async fn subscriber_names(&self, channel: Channel) -> Vec<String> {
        self.subscribers
            .read()
            .await
            .get(&channel)
            .map(|subs| subs.iter().map(|s| s.name().to_string()).collect())
            .unwrap_or_default()
    }

    pub async fn publish(&self, event: LedgerEvent) {
        let subscribers = self
            .subscribers
            .read()
            .await
            .get(&event.channel())
            .cloned()
            .unwrap_or_default();

        for subscriber in subscribers {
            match subscriber.handle(&event).await {
                Ok(_) => {
                    tracing::debug!("{} handled {}", subscriber.name(), event.label());
                }
                Err(e) => {
                    tracing::error!(
                        "{} failed to handle {}: {:?}",
                        subscriber.name(),
                        event.label(),
                        e
                    );
                }
            }
        }
    }
}

/// Wires the ledger consumers onto `ctx.bus`. Registration order is
/// dispatch order.
pub async fn register_consumers(ctx: &ServiceContext) {
    let repos = &ctx.repos;
    let consumers: Vec<Arc<dyn EventSubscriber>> = vec![
        Arc::new(SubscriptionSynchronizer::new(repos.subscriptions.clone())),
        Arc::new(EarningCalculator::new(
            repos.earnings.clone(),
            repos.performers.clone(),
            ctx.settings.clone(),
        )),
        Arc::new(OrderCreator::new(repos.orders.clone(), repos.catalog.clone())),
        Arc::new(NotificationTrigger::new(
            repos.transactions.clone(),
            repos.performers.clone(),
            ctx.integration_manager.clone(),
        )),
    ];

    for consumer in consumers {
        ctx.bus.subscribe(Channel::Transactions, consumer).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventSubscriber for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn handle(&self, _event: &LedgerEvent) -> Result<()> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(AppError::Internal("boom".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatches_in_registration_order_past_failures() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (name, fail) in [("first", false), ("second", true), ("third", false)] {
            bus.subscribe(
                Channel::Transactions,
                Arc::new(Recorder { name, log: log.clone(), fail }),
            )
            .await;
        }

        bus.publish(LedgerEvent::SubscriptionCancelled {
            performer_id: ObjectId::new(),
            user_id: ObjectId::new(),
            transaction_id: None,
        })
        .await;

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(
            bus.subscriber_names(Channel::Transactions).await,
            vec!["first", "second", "third"]
        );
    }
}

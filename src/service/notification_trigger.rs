use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::{PaymentTransaction, TransactionType},
    error::Result,
    events::{EventSubscriber, LedgerEvent},
    integrations::{IntegrationManager, NotificationEvent},
    repository::{PerformerRepository, TransactionRepository},
};

/// Best-effort side channel: tip notifications and performer welcome
/// messages. Work runs on a spawned task so the webhook response never
/// waits on the chat service.
#[derive(Clone)]
pub struct NotificationTrigger {
    transactions: Arc<dyn TransactionRepository>,
    performers: Arc<dyn PerformerRepository>,
    integrations: Arc<IntegrationManager>,
}

impl NotificationTrigger {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        performers: Arc<dyn PerformerRepository>,
        integrations: Arc<IntegrationManager>,
    ) -> Self {
        Self {
            transactions,
            performers,
            integrations,
        }
    }

    /// Resolves what to send for `transaction`, if anything.
    pub async fn notification_for(
        &self,
        transaction: &PaymentTransaction,
        renewal: bool,
    ) -> Result<Option<NotificationEvent>> {
        match transaction.transaction_type {
            TransactionType::SendTip => Ok(Some(NotificationEvent::TipReceived {
                transaction_id: transaction.id.clone(),
                performer_id: transaction.performer_id.clone(),
                user_id: transaction.buyer_id().clone(),
                amount: transaction.total_price,
                message: transaction.description.clone(),
            })),
            t if t.is_subscription() && !renewal => {
                let count = self
                    .transactions
                    .count_successful_subscriptions(transaction.buyer_id(), &transaction.performer_id)
                    .await?;
                if count != 1 {
                    return Ok(None);
                }

                let welcome = self
                    .performers
                    .find_by_id(&transaction.performer_id)
                    .await?
                    .and_then(|p| p.welcome_message);
                Ok(welcome.map(|message| NotificationEvent::WelcomeMessage {
                    performer_id: transaction.performer_id.clone(),
                    user_id: transaction.buyer_id().clone(),
                    message,
                }))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl EventSubscriber for NotificationTrigger {
    fn name(&self) -> &str {
        "NotificationTrigger"
    }

    async fn handle(&self, event: &LedgerEvent) -> Result<()> {
        let LedgerEvent::TransactionSucceeded { transaction, renewal } = event else {
            return Ok(());
        };

        let this = self.clone();
        let transaction = transaction.clone();
        let renewal = *renewal;
        tokio::spawn(async move {
            match this.notification_for(&transaction, renewal).await {
                Ok(Some(notification)) => this.integrations.handle_event(notification).await,
                Ok(None) => {}
                Err(e) => tracing::error!(
                    "Failed to prepare notification for transaction {}: {:?}",
                    transaction.id,
                    e
                ),
            }
        });
        Ok(())
    }
}

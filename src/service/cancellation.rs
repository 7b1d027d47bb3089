use std::sync::Arc;

use crate::{
    domain::{ObjectId, PaymentGateway, Subscription},
    error::{AppError, Result},
    events::{EventBus, LedgerEvent},
    payments::{CancelOutcome, GatewayAccount, Gateways},
    repository::{PerformerRepository, SubscriptionRepository, TransactionRepository},
    service::settings_service::SettingsSnapshot,
};

/// User- and admin-initiated subscription cancellation. Local state only
/// changes once the gateway confirms; the subscription row itself is
/// deactivated by the synchronizer reacting to the published event.
pub struct CancellationService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    transactions: Arc<dyn TransactionRepository>,
    performers: Arc<dyn PerformerRepository>,
    gateways: Gateways,
    settings: SettingsSnapshot,
    bus: Arc<EventBus>,
}

impl CancellationService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        transactions: Arc<dyn TransactionRepository>,
        performers: Arc<dyn PerformerRepository>,
        gateways: Gateways,
        settings: SettingsSnapshot,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            subscriptions,
            transactions,
            performers,
            gateways,
            settings,
            bus,
        }
    }

    pub async fn cancel_for_user(
        &self,
        gateway: PaymentGateway,
        performer_id: &ObjectId,
        user_id: &ObjectId,
    ) -> Result<CancelOutcome> {
        let subscription = self
            .subscriptions
            .find_by_performer_and_user(performer_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
        self.cancel(gateway, subscription).await
    }

    pub async fn cancel_by_admin(
        &self,
        gateway: PaymentGateway,
        subscription_id: &ObjectId,
    ) -> Result<CancelOutcome> {
        let subscription = self
            .subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
        self.cancel(gateway, subscription).await
    }

    async fn cancel(&self, gateway: PaymentGateway, subscription: Subscription) -> Result<CancelOutcome> {
        if !subscription.is_active() {
            return Err(AppError::BadRequest("Subscription is already deactivated".to_string()));
        }

        let transaction = match &subscription.transaction_id {
            Some(id) => self.transactions.find_by_id(id).await?,
            None => None,
        };

        let provider_subscription_id = transaction
            .as_ref()
            .and_then(|tx| tx.gateway_subscription_id())
            .map(str::to_string);

        if let (Some(tx), Some(provider_id)) = (&transaction, &provider_subscription_id) {
            if tx.payment_gateway != gateway {
                return Err(AppError::BadRequest(format!(
                    "Subscription was paid through {}",
                    tx.payment_gateway.as_str()
                )));
            }

            let performer_settings = self.performers.find_payment_settings(&tx.performer_id).await?;
            let global = self.settings.current().await;
            let account = GatewayAccount::resolve(gateway, &performer_settings, &global);

            let outcome = self
                .gateways
                .get(gateway)?
                .cancel_subscription(&account, provider_id)
                .await?;
            if !outcome.success {
                tracing::warn!(
                    "Gateway did not confirm cancel of subscription {} ({})",
                    subscription.id,
                    provider_id
                );
                return Ok(outcome);
            }
        } else {
            tracing::info!(
                "Subscription {} has no provider subscription, cancelling locally",
                subscription.id
            );
        }

        if let Some(tx) = &transaction {
            self.transactions.mark_cancelled(&tx.id).await?;
        }
        self.bus
            .publish(LedgerEvent::SubscriptionCancelled {
                performer_id: subscription.performer_id.clone(),
                user_id: subscription.user_id.clone(),
                transaction_id: transaction.map(|tx| tx.id),
            })
            .await;

        tracing::info!("Cancelled subscription {}", subscription.id);
        Ok(CancelOutcome { success: true })
    }
}

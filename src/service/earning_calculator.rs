use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    domain::{CommissionResolver, Earning, ObjectId, PaymentTransaction},
    error::Result,
    events::{EventSubscriber, LedgerEvent},
    repository::{EarningRepository, PerformerRepository},
    service::settings_service::SettingsSnapshot,
};

/// Books the performer's share of every successful transaction, at most
/// once per transaction.
pub struct EarningCalculator {
    earnings: Arc<dyn EarningRepository>,
    performers: Arc<dyn PerformerRepository>,
    settings: SettingsSnapshot,
}

impl EarningCalculator {
    pub fn new(
        earnings: Arc<dyn EarningRepository>,
        performers: Arc<dyn PerformerRepository>,
        settings: SettingsSnapshot,
    ) -> Self {
        Self {
            earnings,
            performers,
            settings,
        }
    }

    async fn book(&self, transaction: &PaymentTransaction) -> Result<()> {
        let global = self.settings.current().await;
        let performer = self.performers.find_payment_settings(&transaction.performer_id).await?;
        let amounts = CommissionResolver::new(global.commission.clone()).compute(
            transaction.transaction_type,
            transaction.total_price,
            Some(&performer.commission),
        );

        let now = Utc::now();
        let earning = Earning {
            id: ObjectId::new(),
            transaction_id: transaction.id.clone(),
            performer_id: transaction.performer_id.clone(),
            user_id: transaction.buyer_id().clone(),
            source_type: transaction.transaction_type,
            payment_gateway: transaction.payment_gateway,
            gross_price: amounts.gross_price,
            net_price: amounts.net_price,
            commission: amounts.commission,
            is_paid: false,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };

        if self.earnings.create_once(earning).await? {
            tracing::info!(
                "Earning for transaction {}: gross {} net {} commission {}",
                transaction.id,
                amounts.gross_price,
                amounts.net_price,
                amounts.commission
            );
        } else {
            tracing::debug!("Earning for transaction {} already booked", transaction.id);
        }
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for EarningCalculator {
    fn name(&self) -> &str {
        "EarningCalculator"
    }

    async fn handle(&self, event: &LedgerEvent) -> Result<()> {
        match event {
            LedgerEvent::TransactionSucceeded { transaction, .. } => self.book(transaction).await,
            LedgerEvent::SubscriptionCancelled { .. } => Ok(()),
        }
    }
}

//! Price arithmetic and commission resolution.
//!
//! Every amount that is persisted or compared goes through [`round2`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::TransactionType;

/// Commission applied when neither the performer nor the global settings
/// define one for a transaction type.
pub const DEFAULT_COMMISSION: Decimal = Decimal::from_parts(2, 0, 0, false, 1);

pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `round2(original - original * fraction)`
pub fn apply_coupon(original_price: Decimal, fraction: Decimal) -> Decimal {
    round2(original_price - original_price * fraction)
}

/// One optional commission fraction per transaction type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommissionSettings {
    pub monthly_subscription: Option<Decimal>,
    pub yearly_subscription: Option<Decimal>,
    pub sale_video: Option<Decimal>,
    pub sale_gallery: Option<Decimal>,
    pub send_tip: Option<Decimal>,
    pub product: Option<Decimal>,
}

impl CommissionSettings {
    pub fn for_type(&self, transaction_type: TransactionType) -> Option<Decimal> {
        match transaction_type {
            TransactionType::MonthlySubscription => self.monthly_subscription,
            TransactionType::YearlySubscription => self.yearly_subscription,
            TransactionType::SaleVideo => self.sale_video,
            TransactionType::SaleGallery => self.sale_gallery,
            TransactionType::SendTip => self.send_tip,
            TransactionType::Product => self.product,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarningAmounts {
    pub gross_price: Decimal,
    pub net_price: Decimal,
    pub commission: Decimal,
}

/// Performer override beats the global per-type setting, which beats
/// [`DEFAULT_COMMISSION`].
#[derive(Debug, Clone, Default)]
pub struct CommissionResolver {
    global: CommissionSettings,
}

impl CommissionResolver {
    pub fn new(global: CommissionSettings) -> Self {
        Self { global }
    }

    pub fn resolve(
        &self,
        transaction_type: TransactionType,
        performer: Option<&CommissionSettings>,
    ) -> Decimal {
        performer
            .and_then(|p| p.for_type(transaction_type))
            .or_else(|| self.global.for_type(transaction_type))
            .unwrap_or(DEFAULT_COMMISSION)
    }

    pub fn compute(
        &self,
        transaction_type: TransactionType,
        total_price: Decimal,
        performer: Option<&CommissionSettings>,
    ) -> EarningAmounts {
        let commission = self.resolve(transaction_type, performer);
        EarningAmounts {
            gross_price: round2(total_price),
            net_price: round2(total_price * (Decimal::ONE - commission)),
            commission,
        }
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{ObjectId, PaymentGateway, TransactionType};

/// Performer revenue for one successful transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Earning {
    pub id: ObjectId,
    pub transaction_id: ObjectId,
    pub performer_id: ObjectId,
    pub user_id: ObjectId,
    pub source_type: TransactionType,
    pub payment_gateway: PaymentGateway,
    pub gross_price: Decimal,
    pub net_price: Decimal,
    pub commission: Decimal,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

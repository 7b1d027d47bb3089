use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{ObjectId, ProductType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: ObjectId,
    pub transaction_id: ObjectId,
    pub performer_id: ObjectId,
    pub buyer_id: ObjectId,
    pub product_id: ObjectId,
    pub product_type: ProductType,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub delivery_address: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

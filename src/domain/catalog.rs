//! Read-only views of collaborator entities the ledger prices against.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{CommissionSettings, ObjectId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performer {
    pub id: ObjectId,
    pub username: String,
    pub display_name: String,
    pub monthly_price: Decimal,
    pub yearly_price: Decimal,
    pub welcome_message: Option<WelcomeMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMessage {
    pub text: String,
    pub media_type: Option<WelcomeMediaType>,
    pub media_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WelcomeMediaType {
    Image,
    Video,
}

/// Performer-level payment overrides.
#[derive(Debug, Clone, Default)]
pub struct PerformerPaymentSettings {
    pub commission: CommissionSettings,
    pub ccbill: Option<serde_json::Value>,
    pub moonlight: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gallery {
    pub id: ObjectId,
    pub performer_id: ObjectId,
    pub title: String,
    pub is_sale_gallery: bool,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: ObjectId,
    pub performer_id: ObjectId,
    pub title: String,
    pub is_sale: bool,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ObjectId,
    pub performer_id: ObjectId,
    pub name: String,
    pub description: Option<String>,
    pub product_type: CatalogProductType,
    pub price: Decimal,
    pub stock: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogProductType {
    Physical,
    Digital,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: ObjectId,
    pub code: String,
    /// Fraction of the price taken off, between 0 and 1.
    pub value: Decimal,
    pub expired_at: DateTime<Utc>,
    pub single_use: bool,
    pub active: bool,
}

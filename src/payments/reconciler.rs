//! Inbound provider callbacks.
//!
//! Both entry points return a plain boolean acknowledgement: the HTTP layer
//! always answers 200 so providers do not retry-storm us. The authoritative
//! duplicate guard is the conditional `pending -> success` update in the
//! ledger; everything before it only rejects callbacks cheaply.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::{
    domain::{
        subscription_id_of, transaction_id_of, ObjectId, PaymentGateway, PaymentTransaction,
        ResponseInfo, TransactionStatus,
    },
    error::{AppError, Result},
    events::{EventBus, LedgerEvent},
    repository::TransactionRepository,
    service::ledger::TransactionLedger,
};

pub const CCBILL_NEW_SALE: &str = "NewSaleSuccess";
pub const CCBILL_RENEWAL: &str = "RenewalSuccess";
pub const MOONLIGHT_SALE_SUCCESS: &str = "transaction.sale.success";

/// Our transaction id as echoed back by the CCBill flexform.
const CCBILL_OWN_ID_KEYS: &[&str] = &["X-transactionId", "x-transactionId", "X-transactionid"];

/// Inclusive IPv4 range written as `a.b.c.d-a.b.c.e` (or a single address).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl IpRange {
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.start <= ip && ip <= self.end
    }
}

impl FromStr for IpRange {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<Ipv4Addr>()
                .map_err(|e| AppError::Validation(format!("Invalid IP range {}: {}", s, e)))
        };
        let (start, end) = match s.split_once('-') {
            Some((start, end)) => (parse(start)?, parse(end)?),
            None => {
                let ip = parse(s)?;
                (ip, ip)
            }
        };
        if start > end {
            return Err(AppError::Validation(format!("Invalid IP range {}", s)));
        }
        Ok(Self { start, end })
    }
}

pub struct WebhookReconciler {
    transactions: Arc<dyn TransactionRepository>,
    ledger: Arc<TransactionLedger>,
    bus: Arc<EventBus>,
    moonlight_ranges: Vec<IpRange>,
}

impl WebhookReconciler {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        ledger: Arc<TransactionLedger>,
        bus: Arc<EventBus>,
        moonlight_ranges: Vec<IpRange>,
    ) -> Self {
        Self {
            transactions,
            ledger,
            bus,
            moonlight_ranges,
        }
    }

    /// Parses the configured ranges, skipping malformed entries.
    pub fn parse_ranges(ranges: &[String]) -> Vec<IpRange> {
        ranges
            .iter()
            .filter_map(|r| match r.parse() {
                Ok(range) => Some(range),
                Err(e) => {
                    tracing::warn!("Ignoring Moonlight IP range: {}", e);
                    None
                }
            })
            .collect()
    }

    /// `payload` is the query string merged with the body.
    pub async fn handle_ccbill(&self, event_type: Option<&str>, payload: ResponseInfo) -> bool {
        let result = match event_type {
            Some(CCBILL_NEW_SALE) => self.ccbill_new_sale(payload).await,
            Some(CCBILL_RENEWAL) => self.ccbill_renewal(payload).await,
            other => {
                tracing::info!("Ignoring CCBill event {:?}", other);
                return false;
            }
        };

        result.unwrap_or_else(|e| {
            tracing::error!("CCBill {:?} webhook failed: {:?}", event_type, e);
            false
        })
    }

    pub async fn handle_moonlight(&self, client_ip: Option<&str>, body: &Value) -> bool {
        if !self.moonlight_ip_allowed(client_ip) {
            tracing::warn!("Rejected Moonlight webhook from {:?}", client_ip);
            return false;
        }

        match self.moonlight_sale(body).await {
            Ok(handled) => handled,
            Err(e) => {
                tracing::error!("Moonlight webhook failed: {:?}", e);
                false
            }
        }
    }

    fn moonlight_ip_allowed(&self, client_ip: Option<&str>) -> bool {
        // Proxies may append hops; the first address is the client.
        let Some(ip) = client_ip
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<Ipv4Addr>().ok())
        else {
            return false;
        };
        self.moonlight_ranges.iter().any(|range| range.contains(ip))
    }

    async fn ccbill_new_sale(&self, payload: ResponseInfo) -> Result<bool> {
        let Some(id) = CCBILL_OWN_ID_KEYS
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
            .and_then(|raw| ObjectId::parse(raw).ok())
        else {
            tracing::warn!("CCBill sale without a valid transaction id");
            return Ok(false);
        };

        self.complete(&id, &payload, false).await
    }

    async fn ccbill_renewal(&self, payload: ResponseInfo) -> Result<bool> {
        let Some(subscription_id) = subscription_id_of(&payload) else {
            tracing::warn!("CCBill renewal without a subscription id");
            return Ok(false);
        };
        let Some(original) = self
            .transactions
            .find_latest_by_subscription_id(PaymentGateway::Ccbill, &subscription_id)
            .await?
        else {
            tracing::warn!("CCBill renewal for unknown subscription {}", subscription_id);
            return Ok(false);
        };

        self.renew(&original, payload).await
    }

    async fn moonlight_sale(&self, body: &Value) -> Result<bool> {
        let event_type = body.get("event_type").and_then(Value::as_str);
        if event_type != Some(MOONLIGHT_SALE_SUCCESS) {
            tracing::info!("Ignoring Moonlight event {:?}", event_type);
            return Ok(false);
        }

        let payload: ResponseInfo = body
            .get("event_body")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let Some(id) = payload
            .get("order_id")
            .and_then(Value::as_str)
            .and_then(|raw| ObjectId::parse(raw).ok())
        else {
            tracing::warn!("Moonlight sale without a valid order id");
            return Ok(false);
        };

        let Some(transaction) = self.transactions.find_by_id(&id).await? else {
            tracing::warn!("Moonlight sale for unknown transaction {}", id);
            return Ok(false);
        };

        match transaction.status {
            TransactionStatus::Pending => self.complete(&id, &payload, false).await,
            TransactionStatus::Success if is_new_rebill(&transaction, &payload) => {
                self.renew(&transaction, payload).await
            }
            _ => {
                tracing::info!("Moonlight sale for settled transaction {}", id);
                Ok(false)
            }
        }
    }

    async fn complete(&self, id: &ObjectId, payload: &ResponseInfo, renewal: bool) -> Result<bool> {
        let Some(transaction) = self.ledger.complete(id, payload).await? else {
            tracing::info!("Transaction {} is not pending, ignoring delivery", id);
            return Ok(false);
        };

        self.bus
            .publish(LedgerEvent::TransactionSucceeded { transaction, renewal })
            .await;
        Ok(true)
    }

    async fn renew(&self, original: &PaymentTransaction, payload: ResponseInfo) -> Result<bool> {
        let Some(renewal) = self.ledger.open_renewal(original, payload).await? else {
            tracing::info!("Renewal of {} already recorded", original.id);
            return Ok(false);
        };
        self.complete(&renewal.id, &ResponseInfo::new(), true).await
    }
}

/// A successful subscription sale seen again with a provider transaction id
/// we have not recorded is a rebill.
fn is_new_rebill(transaction: &PaymentTransaction, payload: &ResponseInfo) -> bool {
    if !transaction.transaction_type.is_subscription() {
        return false;
    }
    match transaction_id_of(payload) {
        Some(incoming) => transaction.gateway_transaction_id() != Some(incoming.as_str()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inclusive_ranges() {
        let range: IpRange = "104.192.32.81-104.192.32.87".parse().unwrap();
        assert!(range.contains("104.192.32.81".parse().unwrap()));
        assert!(range.contains("104.192.32.87".parse().unwrap()));
        assert!(!range.contains("104.192.32.90".parse().unwrap()));
        assert!(!range.contains("104.192.36.81".parse().unwrap()));

        let single: IpRange = "10.0.0.1".parse().unwrap();
        assert!(single.contains("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert!("104.192.32.87-104.192.32.81".parse::<IpRange>().is_err());
        assert!("not-an-ip".parse::<IpRange>().is_err());

        let parsed = WebhookReconciler::parse_ranges(&[
            "104.192.36.81-104.192.36.87".to_string(),
            "garbage".to_string(),
        ]);
        assert_eq!(parsed.len(), 1);
    }
}

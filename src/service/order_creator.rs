use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    domain::{round2, ObjectId, Order, PaymentTransaction, ProductType, TransactionType},
    error::Result,
    events::{EventSubscriber, LedgerEvent},
    repository::{CatalogRepository, OrderRepository},
};

pub const DELIVERY_ADDRESS_KEY: &str = "deliveryAddress";

/// Turns a paid product bundle into one order per line and takes physical
/// items out of stock.
pub struct OrderCreator {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn CatalogRepository>,
}

impl OrderCreator {
    pub fn new(orders: Arc<dyn OrderRepository>, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { orders, catalog }
    }

    async fn create_orders(&self, transaction: &PaymentTransaction) -> Result<()> {
        let delivery_address = transaction
            .payment_response_info
            .get(DELIVERY_ADDRESS_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        for line in &transaction.products {
            let order = Order {
                id: ObjectId::new(),
                transaction_id: transaction.id.clone(),
                performer_id: transaction.performer_id.clone(),
                buyer_id: transaction.buyer_id().clone(),
                product_id: line.product_id.clone(),
                product_type: line.product_type,
                quantity: line.quantity,
                unit_price: line.price,
                total_price: round2(line.price * rust_decimal::Decimal::from(line.quantity)),
                delivery_address: match line.product_type {
                    ProductType::Physical => delivery_address.clone(),
                    _ => None,
                },
                status: "created".to_string(),
                created_at: Utc::now(),
            };

            if !self.orders.create_once(order).await? {
                tracing::debug!(
                    "Order for product {} on transaction {} already exists",
                    line.product_id,
                    transaction.id
                );
                continue;
            }

            if line.product_type == ProductType::Physical
                && !self.catalog.decrement_stock(&line.product_id, line.quantity).await?
            {
                tracing::warn!(
                    "Product {} sold {} beyond remaining stock on transaction {}",
                    line.product_id,
                    line.quantity,
                    transaction.id
                );
            }
        }

        tracing::info!(
            "Created orders for {} product(s) on transaction {}",
            transaction.products.len(),
            transaction.id
        );
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for OrderCreator {
    fn name(&self) -> &str {
        "OrderCreator"
    }

    async fn handle(&self, event: &LedgerEvent) -> Result<()> {
        match event {
            LedgerEvent::TransactionSucceeded { transaction, .. }
                if transaction.transaction_type == TransactionType::Product =>
            {
                self.create_orders(transaction).await
            }
            _ => Ok(()),
        }
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::{
    domain::*,
    error::{AppError, Result},
    payments::{CheckoutInstructions, CheckoutRequest, GatewayAccount, Gateways},
    repository::{CatalogRepository, CouponRepository, PerformerRepository, TransactionRepository},
    service::{order_creator::DELIVERY_ADDRESS_KEY, settings_service::SettingsSnapshot},
};

/// Gateway-facing options shared by every purchase kind.
#[derive(Debug, Clone)]
pub struct PurchaseOptions {
    pub gateway: PaymentGateway,
    pub coupon_code: Option<String>,
    pub payment_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CartItem {
    pub product_id: ObjectId,
    pub quantity: u32,
}

/// A freshly opened pending transaction and how the buyer pays for it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    pub transaction: PaymentTransaction,
    pub instructions: CheckoutInstructions,
}

/// Owner of the payment transaction ledger. Every purchase opens a pending
/// row; only the reconciler and cancellation move it to a terminal state.
pub struct TransactionLedger {
    transactions: Arc<dyn TransactionRepository>,
    performers: Arc<dyn PerformerRepository>,
    catalog: Arc<dyn CatalogRepository>,
    coupons: Arc<dyn CouponRepository>,
    gateways: Gateways,
    settings: SettingsSnapshot,
}

impl TransactionLedger {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        performers: Arc<dyn PerformerRepository>,
        catalog: Arc<dyn CatalogRepository>,
        coupons: Arc<dyn CouponRepository>,
        gateways: Gateways,
        settings: SettingsSnapshot,
    ) -> Self {
        Self {
            transactions,
            performers,
            catalog,
            coupons,
            gateways,
            settings,
        }
    }

    pub async fn subscribe(
        &self,
        buyer: Party,
        performer_id: &ObjectId,
        transaction_type: TransactionType,
        options: PurchaseOptions,
    ) -> Result<Checkout> {
        let performer = self
            .performers
            .find_by_id(performer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Performer not found".to_string()))?;

        let (price, product_type, label) = match transaction_type {
            TransactionType::MonthlySubscription => {
                (performer.monthly_price, ProductType::MonthlySubscription, "Monthly")
            }
            TransactionType::YearlySubscription => {
                (performer.yearly_price, ProductType::YearlySubscription, "Semiannual")
            }
            other => {
                return Err(AppError::Validation(format!(
                    "{} is not a subscription type",
                    other.as_str()
                )))
            }
        };
        ensure_positive(price, "Subscription price")?;

        let description = format!("{} subscription to {}", label, performer.display_name);
        let new = NewTransaction {
            source: buyer,
            target: TargetKind::Performer,
            target_id: performer.id.clone(),
            performer_id: performer.id.clone(),
            transaction_type,
            original_price: round2(price),
            total_price: round2(price),
            products: vec![PaymentProduct {
                product_id: performer.id.clone(),
                product_type,
                name: description.clone(),
                description: description.clone(),
                price: round2(price),
                quantity: 1,
            }],
            payment_gateway: options.gateway,
            payment_response_info: ResponseInfo::new(),
            coupon_info: None,
            description,
        };

        self.open(new, options).await
    }

    /// Tips are never discounted; a coupon code is ignored.
    pub async fn send_tip(
        &self,
        buyer: Party,
        performer_id: &ObjectId,
        price: Decimal,
        message: Option<String>,
        options: PurchaseOptions,
    ) -> Result<Checkout> {
        let performer = self
            .performers
            .find_by_id(performer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Performer not found".to_string()))?;
        let price = round2(price);
        ensure_positive(price, "Tip amount")?;

        let new = NewTransaction {
            source: buyer,
            target: TargetKind::Tip,
            target_id: performer.id.clone(),
            performer_id: performer.id.clone(),
            transaction_type: TransactionType::SendTip,
            original_price: price,
            total_price: price,
            products: vec![PaymentProduct {
                product_id: performer.id.clone(),
                product_type: ProductType::Tip,
                name: format!("Tip to {}", performer.display_name),
                description: String::new(),
                price,
                quantity: 1,
            }],
            payment_gateway: options.gateway,
            payment_response_info: ResponseInfo::new(),
            coupon_info: None,
            description: message.unwrap_or_default(),
        };

        self.open(new, PurchaseOptions { coupon_code: None, ..options }).await
    }

    pub async fn purchase_gallery(
        &self,
        buyer: Party,
        gallery_id: &ObjectId,
        options: PurchaseOptions,
    ) -> Result<Checkout> {
        let gallery = self
            .catalog
            .find_gallery(gallery_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gallery not found".to_string()))?;
        if !gallery.is_sale_gallery {
            return Err(AppError::Validation("Gallery is not for sale".to_string()));
        }
        ensure_positive(gallery.price, "Gallery price")?;

        let price = round2(gallery.price);
        let new = NewTransaction {
            source: buyer,
            target: TargetKind::Gallery,
            target_id: gallery.id.clone(),
            performer_id: gallery.performer_id.clone(),
            transaction_type: TransactionType::SaleGallery,
            original_price: price,
            total_price: price,
            products: vec![PaymentProduct {
                product_id: gallery.id.clone(),
                product_type: ProductType::SaleGallery,
                name: gallery.title.clone(),
                description: String::new(),
                price,
                quantity: 1,
            }],
            payment_gateway: options.gateway,
            payment_response_info: ResponseInfo::new(),
            coupon_info: None,
            description: format!("Purchase gallery {}", gallery.title),
        };

        self.open(new, options).await
    }

    pub async fn purchase_video(
        &self,
        buyer: Party,
        video_id: &ObjectId,
        options: PurchaseOptions,
    ) -> Result<Checkout> {
        let video = self
            .catalog
            .find_video(video_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;
        if !video.is_sale {
            return Err(AppError::Validation("Video is not for sale".to_string()));
        }
        ensure_positive(video.price, "Video price")?;

        let price = round2(video.price);
        let new = NewTransaction {
            source: buyer,
            target: TargetKind::Video,
            target_id: video.id.clone(),
            performer_id: video.performer_id.clone(),
            transaction_type: TransactionType::SaleVideo,
            original_price: price,
            total_price: price,
            products: vec![PaymentProduct {
                product_id: video.id.clone(),
                product_type: ProductType::SaleVideo,
                name: video.title.clone(),
                description: String::new(),
                price,
                quantity: 1,
            }],
            payment_gateway: options.gateway,
            payment_response_info: ResponseInfo::new(),
            coupon_info: None,
            description: format!("Purchase video {}", video.title),
        };

        self.open(new, options).await
    }

    pub async fn purchase_products(
        &self,
        buyer: Party,
        items: &[CartItem],
        delivery_address: Option<String>,
        options: PurchaseOptions,
    ) -> Result<Checkout> {
        if items.is_empty() {
            return Err(AppError::Validation("No products selected".to_string()));
        }

        // Repeated lines for the same product are summed.
        let mut quantities: BTreeMap<ObjectId, u32> = BTreeMap::new();
        for item in items {
            if item.quantity == 0 {
                return Err(AppError::Validation("Quantity must be at least 1".to_string()));
            }
            *quantities.entry(item.product_id.clone()).or_default() += item.quantity;
        }

        let ids: Vec<ObjectId> = quantities.keys().cloned().collect();
        let products = self.catalog.find_products(&ids).await?;
        if products.len() != ids.len() {
            return Err(AppError::NotFound("Product not found".to_string()));
        }

        let performer_id = products[0].performer_id.clone();
        if products.iter().any(|p| p.performer_id != performer_id) {
            return Err(AppError::DifferentPerformer);
        }

        let mut lines = Vec::with_capacity(products.len());
        let mut original_price = Decimal::ZERO;
        for product in &products {
            let quantity = quantities.get(&product.id).copied().unwrap_or(1);
            ensure_positive(product.price, "Product price")?;
            let product_type = match product.product_type {
                CatalogProductType::Physical => {
                    if i64::from(quantity) > product.stock {
                        return Err(AppError::OverStock(product.name.clone()));
                    }
                    ProductType::Physical
                }
                CatalogProductType::Digital => ProductType::Digital,
            };

            let price = round2(product.price);
            original_price += round2(price * Decimal::from(quantity));
            lines.push(PaymentProduct {
                product_id: product.id.clone(),
                product_type,
                name: product.name.clone(),
                description: product.description.clone().unwrap_or_default(),
                price,
                quantity,
            });
        }

        let mut info = ResponseInfo::new();
        if let Some(address) = delivery_address.filter(|a| !a.trim().is_empty()) {
            info.insert(DELIVERY_ADDRESS_KEY.to_string(), Value::String(address));
        }

        let description = lines
            .iter()
            .map(|l| format!("{} x{}", l.name, l.quantity))
            .collect::<Vec<_>>()
            .join(", ");
        let new = NewTransaction {
            source: buyer,
            target: TargetKind::Product,
            target_id: lines[0].product_id.clone(),
            performer_id,
            transaction_type: TransactionType::Product,
            original_price,
            total_price: original_price,
            products: lines,
            payment_gateway: options.gateway,
            payment_response_info: info,
            coupon_info: None,
            description,
        };

        self.open(new, options).await
    }

    /// Opens an independent pending row for a provider rebill of `original`,
    /// carrying its price, description and provider subscription id forward.
    /// `None` when the rebill was already recorded.
    pub async fn open_renewal(
        &self,
        original: &PaymentTransaction,
        payload: ResponseInfo,
    ) -> Result<Option<PaymentTransaction>> {
        let mut inherited = ResponseInfo::new();
        if let Some(subscription_id) = original.gateway_subscription_id() {
            inherited.insert(
                SUBSCRIPTION_ID_KEY.to_string(),
                Value::String(subscription_id.to_string()),
            );
        }
        // Moonlight rebill payloads carry no subscription id.
        let payload = if subscription_id_of(&payload).is_some() {
            payload
        } else {
            merge_response_info(&payload, &inherited)
        };

        let now = Utc::now();
        let renewal = PaymentTransaction {
            id: ObjectId::new(),
            source: original.source.clone(),
            target: original.target,
            target_id: original.target_id.clone(),
            performer_id: original.performer_id.clone(),
            transaction_type: original.transaction_type,
            status: TransactionStatus::Pending,
            original_price: original.total_price,
            total_price: original.total_price,
            products: original.products.clone(),
            payment_gateway: original.payment_gateway,
            payment_response_info: payload,
            coupon_info: None,
            description: original.description.clone(),
            created_at: now,
            updated_at: now,
        };

        let created = self.transactions.create_if_new(renewal).await?;
        if let Some(tx) = &created {
            tracing::info!("Opened renewal {} of transaction {}", tx.id, original.id);
        }
        Ok(created)
    }

    /// The terminal `pending -> success` transition. `None` when another
    /// delivery already completed the transaction.
    pub async fn complete(&self, id: &ObjectId, payload: &ResponseInfo) -> Result<Option<PaymentTransaction>> {
        let completed = self.transactions.mark_success(id, payload).await?;
        if completed.is_some() {
            tracing::info!("Transaction {} succeeded", id);
        }
        Ok(completed)
    }

    async fn open(&self, mut new: NewTransaction, options: PurchaseOptions) -> Result<Checkout> {
        let subscription = new.transaction_type.is_subscription();
        let gateway = self.gateways.get(new.payment_gateway)?;
        let performer_settings = self.performers.find_payment_settings(&new.performer_id).await?;
        let global = self.settings.current().await;
        let account = GatewayAccount::resolve(new.payment_gateway, &performer_settings, &global);
        gateway.validate_account(&account, subscription)?;

        let coupon = match options.coupon_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Some(self.validate_coupon(code, new.source.id()).await?),
            _ => None,
        };
        if let Some(coupon) = &coupon {
            new.total_price = apply_coupon(new.original_price, coupon.value);
            new.coupon_info = Some(CouponSnapshot {
                coupon_id: coupon.id.clone(),
                code: coupon.code.clone(),
                value: coupon.value,
            });
        }

        let transaction = self.transactions.create(pending(new)).await?;
        if let Some(coupon) = &coupon {
            let claimed = self
                .coupons
                .claim_usage(&coupon.id, transaction.buyer_id(), &transaction.id)
                .await?;
            if !claimed {
                self.transactions.mark_cancelled(&transaction.id).await?;
                return Err(AppError::Validation("Coupon has already been used".to_string()));
            }
        }

        let request = CheckoutRequest {
            transaction_id: transaction.id.clone(),
            price: transaction.total_price,
            period_days: transaction.transaction_type.period_days(),
            payment_token: options.payment_token,
            description: transaction.description.clone(),
        };
        let checkout = if subscription {
            gateway.subscription_checkout(&account, &request).await
        } else {
            gateway.single_purchase_checkout(&account, &request).await
        };

        let instructions = match checkout {
            Ok(instructions) => instructions,
            Err(e) => {
                tracing::warn!("Checkout for transaction {} failed: {:?}", transaction.id, e);
                self.transactions.mark_cancelled(&transaction.id).await?;
                if coupon.is_some() {
                    self.coupons.release_usage(&transaction.id).await?;
                }
                return Err(e);
            }
        };

        if let CheckoutInstructions::Charged { response } = &instructions {
            self.transactions.record_response_info(&transaction.id, response).await?;
        }
        let transaction = self
            .transactions
            .find_by_id(&transaction.id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Transaction {} vanished", transaction.id)))?;

        tracing::info!(
            "Opened {} transaction {} for {} via {}",
            transaction.transaction_type.as_str(),
            transaction.id,
            transaction.total_price,
            transaction.payment_gateway.as_str()
        );
        Ok(Checkout {
            transaction,
            instructions,
        })
    }

    async fn validate_coupon(&self, code: &str, user_id: &ObjectId) -> Result<Coupon> {
        let coupon = self
            .coupons
            .find_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound("Coupon not found".to_string()))?;

        if !coupon.active {
            return Err(AppError::Validation("Coupon is inactive".to_string()));
        }
        if coupon.expired_at <= Utc::now() {
            return Err(AppError::Validation("Coupon has expired".to_string()));
        }
        if coupon.value < Decimal::ZERO || coupon.value > Decimal::ONE {
            return Err(AppError::Validation("Coupon value is out of range".to_string()));
        }
        if coupon.single_use && self.coupons.count_usages(&coupon.id, user_id).await? > 0 {
            return Err(AppError::Validation("Coupon has already been used".to_string()));
        }
        Ok(coupon)
    }
}

fn pending(new: NewTransaction) -> PaymentTransaction {
    let now = Utc::now();
    PaymentTransaction {
        id: ObjectId::new(),
        source: new.source,
        target: new.target,
        target_id: new.target_id,
        performer_id: new.performer_id,
        transaction_type: new.transaction_type,
        status: TransactionStatus::Pending,
        original_price: new.original_price,
        total_price: new.total_price,
        products: new.products,
        payment_gateway: new.payment_gateway,
        payment_response_info: new.payment_response_info,
        coupon_info: new.coupon_info,
        description: new.description,
        created_at: now,
        updated_at: now,
    }
}

fn ensure_positive(price: Decimal, what: &str) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(AppError::Validation(format!("{} must be positive", what)));
    }
    Ok(())
}

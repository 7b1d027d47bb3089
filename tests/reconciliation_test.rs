mod support;

use chrono::Duration;
use fanledger::{
    domain::*,
    events::Channel,
    payments::CheckoutInstructions,
    repository::{EarningRepository, SubscriptionRepository, TransactionRepository},
};
use serde_json::json;
use support::*;

#[tokio::test]
async fn gallery_sale_settles_with_default_commission() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let performer = insert_performer(&app.pool, "9.99", "49.99", None).await?;
    let gallery = insert_gallery(&app.pool, &performer, "10.00", true).await?;
    let buyer = ObjectId::new();

    let checkout = app
        .ctx
        .ledger
        .purchase_gallery(Party::User(buyer.clone()), &gallery, ccbill())
        .await?;
    assert_eq!(checkout.transaction.status, TransactionStatus::Pending);
    assert!(matches!(checkout.instructions, CheckoutInstructions::Redirect { .. }));
    let id = checkout.transaction.id.clone();

    assert!(app.ccbill_sale(&id, "0312000001", None).await);

    let tx = app.transaction(&id).await?;
    assert_eq!(tx.status, TransactionStatus::Success);
    assert_eq!(tx.payment_response_info["transactionId"], "0312000001");

    let earning = app
        .ctx
        .repos
        .earnings
        .find_by_transaction(&id)
        .await?
        .expect("earning booked");
    assert_eq!(earning.gross_price, dec("10.00"));
    assert_eq!(earning.commission, dec("0.2"));
    assert_eq!(earning.net_price, dec("8.00"));
    assert!(!earning.is_paid);

    let subscription = app
        .ctx
        .repos
        .subscriptions
        .find_by_performer_and_user(&performer, &buyer)
        .await?;
    assert!(subscription.is_none());
    assert_eq!(count_rows(&app.pool, "subscriptions").await?, 0);
    Ok(())
}

#[tokio::test]
async fn replayed_sale_changes_nothing() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let performer = insert_performer(&app.pool, "9.99", "49.99", None).await?;
    let buyer = ObjectId::new();

    let checkout = app
        .ctx
        .ledger
        .subscribe(
            Party::User(buyer.clone()),
            &performer,
            TransactionType::MonthlySubscription,
            ccbill(),
        )
        .await?;
    let id = checkout.transaction.id;

    assert!(app.ccbill_sale(&id, "0312000002", Some("0115000001000000001")).await);
    let first = app.transaction(&id).await?;
    let subscription = app
        .ctx
        .repos
        .subscriptions
        .find_by_performer_and_user(&performer, &buyer)
        .await?
        .expect("subscription created");

    assert!(!app.ccbill_sale(&id, "0312000002", Some("0115000001000000001")).await);

    let second = app.transaction(&id).await?;
    assert_eq!(second.status, TransactionStatus::Success);
    assert_eq!(second.updated_at, first.updated_at);
    assert_eq!(count_rows(&app.pool, "earnings").await?, 1);
    assert_eq!(count_rows(&app.pool, "subscriptions").await?, 1);

    let after = app
        .ctx
        .repos
        .subscriptions
        .find_by_performer_and_user(&performer, &buyer)
        .await?
        .expect("subscription kept");
    assert_eq!(after.expired_at, subscription.expired_at);
    Ok(())
}

#[tokio::test]
async fn subscription_expiry_follows_plan_period() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let buyer = ObjectId::new();

    for (transaction_type, days, subscription_type) in [
        (TransactionType::MonthlySubscription, 30, SubscriptionType::Monthly),
        (TransactionType::YearlySubscription, 180, SubscriptionType::Semiannual),
    ] {
        let performer = insert_performer(&app.pool, "9.99", "49.99", None).await?;
        let checkout = app
            .ctx
            .ledger
            .subscribe(Party::User(buyer.clone()), &performer, transaction_type, ccbill())
            .await?;
        assert_eq!(app.ccbill.checkouts.lock().unwrap().last().unwrap().period_days, Some(days as u32));

        let provider_txn = format!("txn-{}", checkout.transaction.id);
        assert!(app.ccbill_sale(&checkout.transaction.id, &provider_txn, None).await);

        let tx = app.transaction(&checkout.transaction.id).await?;
        let subscription = app
            .ctx
            .repos
            .subscriptions
            .find_by_performer_and_user(&performer, &buyer)
            .await?
            .expect("subscription created");

        let drift = subscription.expired_at - tx.created_at - Duration::days(days);
        assert!(drift >= Duration::zero() && drift < Duration::minutes(1));
        assert_eq!(subscription.subscription_type, subscription_type);
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(subscription.transaction_id.as_ref(), Some(&tx.id));
        assert_eq!(subscription.next_recurring_date, subscription.expired_at);
    }
    Ok(())
}

#[tokio::test]
async fn ccbill_renewal_opens_a_new_transaction() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let performer = insert_performer(&app.pool, "9.99", "49.99", None).await?;
    let buyer = ObjectId::new();
    let checkout = app
        .ctx
        .ledger
        .subscribe(
            Party::User(buyer.clone()),
            &performer,
            TransactionType::MonthlySubscription,
            ccbill(),
        )
        .await?;
    let original = checkout.transaction.id;
    assert!(app.ccbill_sale(&original, "0312000010", Some("0115000009")).await);

    let renewal = info(json!({
        "subscriptionId": "0115000009",
        "transactionId": "0312000011",
        "renewalDate": "2026-11-15",
        "nextRenewalDate": "2026-12-15",
    }));
    assert!(app.ctx.reconciler.handle_ccbill(Some("RenewalSuccess"), renewal.clone()).await);
    assert!(!app.ctx.reconciler.handle_ccbill(Some("RenewalSuccess"), renewal).await);

    assert_eq!(count_rows(&app.pool, "payment_transactions").await?, 2);
    assert_eq!(count_rows(&app.pool, "earnings").await?, 2);
    assert_eq!(app.transaction(&original).await?.status, TransactionStatus::Success);

    let subscription = app
        .ctx
        .repos
        .subscriptions
        .find_by_performer_and_user(&performer, &buyer)
        .await?
        .expect("subscription renewed");
    let renewal_id = subscription.transaction_id.clone().expect("linked to renewal");
    assert_ne!(renewal_id, original);
    assert_eq!(subscription.next_recurring_date.to_rfc3339(), "2026-12-15T00:00:00+00:00");

    let renewal_tx = app.transaction(&renewal_id).await?;
    assert_eq!(renewal_tx.status, TransactionStatus::Success);
    assert_eq!(renewal_tx.total_price, dec("9.99"));
    assert_eq!(renewal_tx.gateway_subscription_id(), Some("0115000009"));

    let unknown = info(json!({ "subscriptionId": "999", "transactionId": "1" }));
    assert!(!app.ctx.reconciler.handle_ccbill(Some("RenewalSuccess"), unknown).await);
    Ok(())
}

#[tokio::test]
async fn ccbill_rejects_unknown_events_and_malformed_ids() -> anyhow::Result<()> {
    let app = TestApp::new().await?;

    let payload = info(json!({ "X-transactionId": ObjectId::new().as_str() }));
    assert!(!app.ctx.reconciler.handle_ccbill(Some("Chargeback"), payload.clone()).await);
    assert!(!app.ctx.reconciler.handle_ccbill(None, payload).await);

    let malformed = info(json!({ "X-transactionId": "12345" }));
    assert!(!app.ctx.reconciler.handle_ccbill(Some("NewSaleSuccess"), malformed).await);
    assert_eq!(app.transactions.lookups(), 0);

    // Well-formed but unknown id reaches the ledger and is refused there.
    assert!(!app.ccbill_sale(&ObjectId::new(), "1", None).await);
    Ok(())
}

#[tokio::test]
async fn moonlight_outside_ip_range_is_rejected_before_lookup() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let body = json!({
        "event_type": "transaction.sale.success",
        "event_body": { "order_id": ObjectId::new().as_str(), "transaction_id": "1" }
    });

    assert!(!app.ctx.reconciler.handle_moonlight(Some("104.192.32.90"), &body).await);
    assert!(!app.ctx.reconciler.handle_moonlight(None, &body).await);
    assert!(!app.ctx.reconciler.handle_moonlight(Some("not an ip"), &body).await);
    assert_eq!(app.transactions.lookups(), 0);
    Ok(())
}

#[tokio::test]
async fn moonlight_sale_and_rebill() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let performer = insert_performer(&app.pool, "19.99", "99.99", None).await?;
    let buyer = ObjectId::new();

    let checkout = app
        .ctx
        .ledger
        .subscribe(
            Party::User(buyer.clone()),
            &performer,
            TransactionType::MonthlySubscription,
            moonlight(),
        )
        .await?;
    let id = checkout.transaction.id.clone();
    let provider_sub = format!("mls-{}", id);
    // The charge reply is recorded right away.
    assert_eq!(checkout.transaction.gateway_subscription_id(), Some(provider_sub.as_str()));
    assert_eq!(checkout.transaction.status, TransactionStatus::Pending);

    let sale = |transaction_id: String| {
        json!({
            "event_type": "transaction.sale.success",
            "event_body": { "order_id": id.as_str(), "transaction_id": transaction_id }
        })
    };

    let ip = Some("104.192.36.85");
    assert!(!app.ctx.reconciler.handle_moonlight(ip, &json!({ "event_type": "transaction.refund.success" })).await);
    assert!(app.ctx.reconciler.handle_moonlight(ip, &sale(format!("ml-{}", id))).await);
    assert_eq!(app.transaction(&id).await?.status, TransactionStatus::Success);

    // Same provider transaction again: duplicate, not a rebill.
    assert!(!app.ctx.reconciler.handle_moonlight(ip, &sale(format!("ml-{}", id))).await);
    assert_eq!(count_rows(&app.pool, "payment_transactions").await?, 1);

    assert!(app.ctx.reconciler.handle_moonlight(ip, &sale("ml-rebill-1".to_string())).await);
    assert!(!app.ctx.reconciler.handle_moonlight(ip, &sale("ml-rebill-1".to_string())).await);
    assert_eq!(count_rows(&app.pool, "payment_transactions").await?, 2);
    assert_eq!(count_rows(&app.pool, "earnings").await?, 2);
    assert_eq!(count_rows(&app.pool, "subscriptions").await?, 1);
    Ok(())
}

#[tokio::test]
async fn checkout_reply_recorded_after_fast_settlement() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let performer = insert_performer(&app.pool, "9.99", "49.99", None).await?;
    let checkout = app
        .ctx
        .ledger
        .subscribe(
            Party::User(ObjectId::new()),
            &performer,
            TransactionType::MonthlySubscription,
            ccbill(),
        )
        .await?;
    let id = checkout.transaction.id;
    let transactions = &app.ctx.repos.transactions;

    // The sale webhook lands before the checkout reply is written.
    transactions
        .mark_success(&id, &info(json!({ "transaction_id": "0312000500" })))
        .await?
        .expect("settled");
    transactions
        .record_response_info(
            &id,
            &info(json!({ "subscription_id": "0115000500", "transaction_id": "late" })),
        )
        .await?;

    let tx = app.transaction(&id).await?;
    assert_eq!(tx.status, TransactionStatus::Success);
    assert_eq!(tx.gateway_subscription_id(), Some("0115000500"));
    assert_eq!(tx.gateway_transaction_id(), Some("0312000500"));

    let found = transactions
        .find_latest_by_subscription_id(PaymentGateway::Ccbill, "0115000500")
        .await?
        .expect("indexed by subscription id");
    assert_eq!(found.id, id);
    Ok(())
}

#[tokio::test]
async fn consumers_are_registered_in_order() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    assert_eq!(
        app.ctx.bus.subscriber_names(Channel::Transactions).await,
        vec![
            "SubscriptionSynchronizer",
            "EarningCalculator",
            "OrderCreator",
            "NotificationTrigger"
        ]
    );
    Ok(())
}

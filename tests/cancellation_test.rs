mod support;

use fanledger::{
    domain::*,
    error::AppError,
    repository::SubscriptionRepository,
};
use serde_json::json;
use support::*;

/// A paid monthly subscription billed through CCBill subscription `sub_id`.
async fn subscribed(app: &TestApp, sub_id: Option<&str>) -> anyhow::Result<(ObjectId, ObjectId, ObjectId)> {
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
    assert!(app.ccbill_sale(&id, &format!("txn-{}", id), sub_id).await);
    Ok((performer, buyer, id))
}

async fn subscription(app: &TestApp, performer: &ObjectId, buyer: &ObjectId) -> anyhow::Result<Subscription> {
    app.ctx
        .repos
        .subscriptions
        .find_by_performer_and_user(performer, buyer)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no subscription"))
}

#[tokio::test]
async fn confirmed_cancel_deactivates_and_cancels() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (performer, buyer, id) = subscribed(&app, Some("0115000001000000042")).await?;
    let before = subscription(&app, &performer, &buyer).await?;

    let outcome = app
        .ctx
        .cancellation
        .cancel_for_user(PaymentGateway::Ccbill, &performer, &buyer)
        .await?;
    assert!(outcome.success);
    assert_eq!(*app.ccbill.cancelled.lock().unwrap(), vec!["0115000001000000042".to_string()]);

    let after = subscription(&app, &performer, &buyer).await?;
    assert_eq!(after.status, SubscriptionStatus::Deactivated);
    // Access runs to the end of the paid period.
    assert_eq!(after.expired_at, before.expired_at);
    assert_eq!(app.transaction(&id).await?.status, TransactionStatus::Cancelled);

    let twice = app
        .ctx
        .cancellation
        .cancel_for_user(PaymentGateway::Ccbill, &performer, &buyer)
        .await;
    assert!(matches!(twice, Err(AppError::BadRequest(_))));
    Ok(())
}

#[tokio::test]
async fn unconfirmed_cancel_changes_nothing() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (performer, buyer, id) = subscribed(&app, Some("0115000001000000043")).await?;
    app.ccbill.set_cancel_succeeds(false);

    let outcome = app
        .ctx
        .cancellation
        .cancel_for_user(PaymentGateway::Ccbill, &performer, &buyer)
        .await?;
    assert!(!outcome.success);

    assert_eq!(subscription(&app, &performer, &buyer).await?.status, SubscriptionStatus::Active);
    assert_eq!(app.transaction(&id).await?.status, TransactionStatus::Success);
    Ok(())
}

#[tokio::test]
async fn subscription_without_provider_id_cancels_locally() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (performer, buyer, id) = subscribed(&app, None).await?;
    let sub = subscription(&app, &performer, &buyer).await?;

    let outcome = app
        .ctx
        .cancellation
        .cancel_by_admin(PaymentGateway::Ccbill, &sub.id)
        .await?;
    assert!(outcome.success);
    assert!(app.ccbill.cancelled.lock().unwrap().is_empty());

    assert_eq!(subscription(&app, &performer, &buyer).await?.status, SubscriptionStatus::Deactivated);
    assert_eq!(app.transaction(&id).await?.status, TransactionStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn cancel_through_the_wrong_gateway_is_refused() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (performer, buyer, _) = subscribed(&app, Some("0115000001000000044")).await?;

    let result = app
        .ctx
        .cancellation
        .cancel_for_user(PaymentGateway::Moonlight, &performer, &buyer)
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
    assert!(app.moonlight.cancelled.lock().unwrap().is_empty());

    let missing = app
        .ctx
        .cancellation
        .cancel_by_admin(PaymentGateway::Ccbill, &ObjectId::new())
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn cancel_after_moonlight_rebill_reaches_the_provider() -> anyhow::Result<()> {
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
    let id = checkout.transaction.id;
    let sale = |transaction_id: &str| {
        json!({
            "event_type": "transaction.sale.success",
            "event_body": { "order_id": id.as_str(), "transaction_id": transaction_id }
        })
    };

    let ip = Some("104.192.36.81");
    assert!(app.ctx.reconciler.handle_moonlight(ip, &sale(&format!("ml-{}", id))).await);
    assert!(app.ctx.reconciler.handle_moonlight(ip, &sale("ml-rebill-1")).await);

    let renewal_id = subscription(&app, &performer, &buyer)
        .await?
        .transaction_id
        .expect("linked transaction");
    assert_ne!(renewal_id, id);
    let renewal = app.transaction(&renewal_id).await?;
    assert_eq!(renewal.gateway_subscription_id(), Some(format!("mls-{}", id).as_str()));
    assert_eq!(renewal.gateway_transaction_id(), Some("ml-rebill-1"));

    let outcome = app
        .ctx
        .cancellation
        .cancel_for_user(PaymentGateway::Moonlight, &performer, &buyer)
        .await?;
    assert!(outcome.success);
    assert_eq!(*app.moonlight.cancelled.lock().unwrap(), vec![format!("mls-{}", id)]);
    assert_eq!(app.transaction(&renewal_id).await?.status, TransactionStatus::Cancelled);
    Ok(())
}

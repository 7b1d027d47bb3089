pub mod purchases;
pub mod root;
pub mod subscriptions;
pub mod webhooks;

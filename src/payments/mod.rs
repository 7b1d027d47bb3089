pub mod ccbill;
pub mod gateway;
pub mod moonlight;
pub mod reconciler;

pub use ccbill::CCBillGateway;
pub use gateway::{
    CancelOutcome, CheckoutGateway, CheckoutInstructions, CheckoutRequest, GatewayAccount, Gateways,
};
pub use moonlight::MoonlightGateway;
pub use reconciler::{IpRange, WebhookReconciler};

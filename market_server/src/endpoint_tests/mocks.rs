use mockall::mock;
use market_engine::traits::{CheckoutSession, GatewayError, PaymentGateway};
use mkt_common::Price;

mock! {
    pub PaymentProcessor {}
    impl PaymentGateway for PaymentProcessor {
        async fn create_checkout_session(
            &self,
            amount: Price,
            success_url: &str,
            cancel_url: &str,
        ) -> Result<CheckoutSession, GatewayError>;
        async fn refund(&self, payment_reference: &str, idempotency_key: &str) -> Result<(), GatewayError>;
    }
}

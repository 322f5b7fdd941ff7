use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use market_engine::{
    events::{EventHandlers, EventHooks, EventProducers, OrderAnnulledEvent, OrderCompletedEvent, OrderPaidEvent, RefundFailedEvent},
    traits::LoggingProfileStore,
    OrderFlowApi,
    OrderQueryApi,
    RatingAggregator,
    SqliteDatabase,
};

use crate::{
    auth::TokenIssuer,
    config::ServerConfig,
    errors::ServerError,
    integrations::gateway::{GatewayConfig, RestPaymentGateway},
    middleware::SignatureMiddlewareFactory,
    routes::{
        health,
        BuyOrderRoute,
        CancelOrderRoute,
        ConfirmDeliveryRateRoute,
        ConfirmShippingRoute,
        Gateway,
        ItemCreateRoute,
        LatestBuyOrdersRoute,
        LatestSellOrdersRoute,
        OrderCreateRoute,
        SellOrderRoute,
    },
    webhook_routes::PaymentWebhookRoute,
};

/// The header the payment gateway uses to carry its HMAC signature on webhook deliveries.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-payment-signature";

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = RestPaymentGateway::new(GatewayConfig::from_env_or_default())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(25, default_event_hooks(db.clone()));
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let srv = create_server_instance(config, db, gateway, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// The stock set of event hooks: notification logs for lifecycle events, rating publication on
/// completion, and an operator alert when a refund gives up.
pub fn default_event_hooks(db: SqliteDatabase) -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev: OrderPaidEvent| {
        Box::pin(async move {
            info!(
                "📬️ Order {} is paid. Notifying buyer {} and seller {}.",
                ev.order.order_id, ev.order.buyer_id, ev.order.seller_id
            );
        })
    });
    hooks.on_order_annulled(|ev: OrderAnnulledEvent| {
        Box::pin(async move {
            info!("📬️ Order {} was annulled ({}). Notifying buyer {}.", ev.order.order_id, ev.status, ev.order.buyer_id);
        })
    });
    hooks.on_order_completed(move |ev: OrderCompletedEvent| {
        let db = db.clone();
        Box::pin(async move {
            let aggregator = RatingAggregator::new(db, LoggingProfileStore);
            match aggregator.publish(&ev.order.seller_id).await {
                Ok(avg) => info!("⭐️ Seller {} average rating is now {avg:?}", ev.order.seller_id),
                Err(e) => error!("⭐️ Could not publish rating for seller {}. {e}", ev.order.seller_id),
            }
        })
    });
    hooks.on_refund_failed(|ev: RefundFailedEvent| {
        Box::pin(async move {
            error!(
                "🚨️ Refund for order {} could not be issued ({}). Buyer {} has been charged for an item they will \
                 not receive. Manual intervention required.",
                ev.order.order_id, ev.reason, ev.order.buyer_id
            );
        })
    });
    hooks
}

pub fn create_server_instance<G>(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: G,
    producers: EventProducers,
) -> Result<Server, ServerError>
where
    G: Gateway + Send + 'static,
{
    let srv = HttpServer::new(move || {
        let order_flow_api =
            OrderFlowApi::new(db.clone(), gateway.clone(), config.checkout_urls.clone(), producers.clone());
        let query_api = OrderQueryApi::new(db.clone());
        let jwt_signer = TokenIssuer::new(&config.auth);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mkt::access_log"))
            .app_data(web::Data::new(order_flow_api))
            .app_data(web::Data::new(query_api))
            .app_data(web::Data::new(jwt_signer));
        // Routes that require a bearer token
        let api_scope = web::scope("/api")
            .service(OrderCreateRoute::<SqliteDatabase, G>::new())
            .service(ConfirmShippingRoute::<SqliteDatabase, G>::new())
            .service(CancelOrderRoute::<SqliteDatabase, G>::new())
            .service(ConfirmDeliveryRateRoute::<SqliteDatabase, G>::new())
            .service(ItemCreateRoute::<SqliteDatabase, G>::new())
            .service(BuyOrderRoute::<SqliteDatabase>::new())
            .service(SellOrderRoute::<SqliteDatabase>::new())
            .service(LatestBuyOrdersRoute::<SqliteDatabase>::new())
            .service(LatestSellOrdersRoute::<SqliteDatabase>::new());
        // Gateway deliveries authenticate with an HMAC over the raw body instead of a JWT.
        let webhook_scope = web::scope("/webhooks")
            .wrap(SignatureMiddlewareFactory::new(
                WEBHOOK_SIGNATURE_HEADER,
                config.webhook_secret.clone(),
                config.webhook_signature_checks,
            ))
            .service(PaymentWebhookRoute::<SqliteDatabase, G>::new());
        app.service(health).service(api_scope).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

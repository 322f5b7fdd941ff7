//----------------------------------------------   Webhooks  ----------------------------------------------------

use actix_web::{web, HttpRequest, HttpResponse};
use log::*;
use market_engine::{
    traits::{MarketplaceDatabase, OrderFlowError, PaymentCompleted},
    OrderFlowApi,
};

use crate::{
    data_objects::{JsonResponse, PaymentWebhookEvent, PAYMENT_COMPLETED_EVENT},
    errors::ServerError,
    route,
    routes::Gateway,
};

route!(payment_webhook => Post "/payment" impl MarketplaceDatabase, Gateway);
/// Receives payment-gateway webhook deliveries. The signature middleware has already verified
/// the HMAC on the raw body by the time this handler runs.
///
/// Webhook responses must stay in the 200 range for everything except genuine processing
/// failures, otherwise the gateway keeps redelivering events we have already dealt with.
/// Duplicates, events for terminal orders, unknown sessions and unrecognized event kinds are all
/// acknowledged with a 200.
pub async fn payment_webhook<B, G>(
    req: HttpRequest,
    body: web::Json<PaymentWebhookEvent>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: MarketplaceDatabase,
    G: Gateway,
{
    trace!("🔔️ Received webhook request: {}", req.uri());
    let event = body.into_inner();
    if event.kind != PAYMENT_COMPLETED_EVENT {
        debug!("🔔️ Ignoring webhook event {} of kind {}", event.id, event.kind);
        return Ok(acknowledge());
    }
    let (session_id, payment_reference) = match (event.data.checkout_session_id, event.data.payment_reference) {
        (Some(s), Some(p)) => (s, p),
        _ => {
            warn!("🔔️ Event {} is a {PAYMENT_COMPLETED_EVENT} event but is missing payload fields.", event.id);
            return Err(ServerError::InvalidRequestBody(format!(
                "Event {} is missing checkoutSessionId or paymentReference",
                event.id
            )));
        },
    };
    let payment = PaymentCompleted { event_id: event.id.clone(), checkout_session_id: session_id, payment_reference };
    match api.handle_payment_completed(payment).await {
        Ok(outcome) => {
            trace!("🔔️ Event {} resolved as {outcome:?}", event.id);
            Ok(acknowledge())
        },
        // A database failure is the one case where we *want* the gateway to redeliver.
        Err(e @ OrderFlowError::DatabaseError(_)) => {
            error!("🔔️ Could not process event {}. {e}", event.id);
            Err(ServerError::BackendError(e.to_string()))
        },
        Err(e) => {
            warn!("🔔️ Unexpected error while handling webhook event {}. {e}", event.id);
            Ok(HttpResponse::Ok().json(JsonResponse::failure("Unexpected error handling event.")))
        },
    }
}

fn acknowledge() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "received": true }))
}

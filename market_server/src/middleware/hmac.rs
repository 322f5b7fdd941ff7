//! Webhook signature middleware.
//!
//! The payment gateway signs every webhook delivery with HMAC-SHA256 over the raw request body,
//! using the shared webhook secret, and puts the base64 signature in the `x-payment-signature`
//! header. This middleware verifies that signature before the payload reaches any handler; a
//! missing or invalid signature is rejected with a 400 and no state is touched.
//!
//! Verification needs the raw bytes, so the middleware drains the payload, checks the HMAC, and
//! replays the bytes into a fresh payload for the downstream extractors.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorBadRequest,
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use mkt_common::Secret;

use crate::helpers::calculate_hmac;

pub struct SignatureMiddlewareFactory {
    signature_header: String,
    key: Secret<String>,
    // If false, then the middleware will not check the signature and always allow the call
    enabled: bool,
}

impl SignatureMiddlewareFactory {
    pub fn new(signature_header: &str, key: Secret<String>, enabled: bool) -> Self {
        SignatureMiddlewareFactory { signature_header: signature_header.into(), key, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SignatureMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = SignatureMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SignatureMiddlewareService {
            signature_header: self.signature_header.clone(),
            key: self.key.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct SignatureMiddlewareService<S> {
    signature_header: String,
    key: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SignatureMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.reveal().clone();
        let signature_header = self.signature_header.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature for request");
            if !enabled {
                trace!("🔐️ Webhook signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let expected = calculate_hmac(&secret, data.as_ref());
            let signature = req.headers().get(&signature_header).ok_or_else(|| {
                warn!("🔐️ No signature found in webhook request. Denying access.");
                ErrorBadRequest("No webhook signature found.")
            })?;
            let validated = signature == expected.as_str();
            if validated {
                trace!("🔐️ Webhook signature check ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid signature found in webhook request. Denying access.");
                Err(ErrorBadRequest("Invalid webhook signature."))
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}

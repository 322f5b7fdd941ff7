//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. For this reason, any long, non-cpu-bound operation (e.g. I/O,
//! database operations, gateway calls) must be expressed as futures or asynchronous functions so worker threads can
//! interleave other requests while they wait.
use actix_web::{get, http::StatusCode, web, HttpResponse, Responder};
use log::*;
use market_engine::{
    db_types::{NewItem, OrderId},
    traits::{ItemStore, MarketplaceDatabase, PaymentGateway},
    OrderFlowApi,
    OrderQueryApi,
    Pagination,
};
use mkt_common::Price;

use crate::{
    auth::JwtClaims,
    data_objects::{
        ConfirmShippingRequest,
        CreateItemRequest,
        CreateOrderRequest,
        CreateOrderResponse,
        DeliveryRatingRequest,
        OrderResult,
    },
    errors::ServerError,
};

/// A payment-gateway client as the order-flow API consumes it.
///
/// Exists because the `route!` macro needs one trait per handler type parameter.
pub trait Gateway: PaymentGateway + Clone {}
impl<T: PaymentGateway + Clone> Gateway for T {}

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
                impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------

route!(order_create => Post "/order/create" impl MarketplaceDatabase, Gateway);
/// Creates a purchase intent for the authenticated buyer and returns the checkout URL to
/// redirect them to. Responds 201 on success, 409 if the item is unavailable or already sold.
pub async fn order_create<B, G>(
    claims: JwtClaims,
    body: web::Json<CreateOrderRequest>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: MarketplaceDatabase,
    G: Gateway,
{
    let params = body.into_inner();
    debug!("💻️ POST order_create for item {} by {}", params.item_id, claims.user_id());
    let (order, checkout_url) = api.create_order(claims.user_id(), &params.item_id).await?;
    let response = CreateOrderResponse { order_id: order.order_id.as_str().to_string(), checkout_url };
    Ok(HttpResponse::build(StatusCode::CREATED).json(response))
}

route!(confirm_shipping => Post "/order/confirm-shipping" impl MarketplaceDatabase, Gateway);
pub async fn confirm_shipping<B, G>(
    claims: JwtClaims,
    body: web::Json<ConfirmShippingRequest>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: MarketplaceDatabase,
    G: Gateway,
{
    let oid = OrderId::from(body.into_inner().order_id);
    debug!("💻️ POST confirm_shipping for {oid} by {}", claims.user_id());
    let order = api.confirm_shipping(&oid, claims.user_id()).await?;
    Ok(HttpResponse::Ok().json(OrderResult::from(order)))
}

route!(cancel_order => Post "/order/cancel/{order_id}" impl MarketplaceDatabase, Gateway);
pub async fn cancel_order<B, G>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: MarketplaceDatabase,
    G: Gateway,
{
    let oid = OrderId::from(path.into_inner());
    debug!("💻️ POST cancel_order for {oid} by {}", claims.user_id());
    let order = api.cancel_order(&oid, claims.user_id()).await?;
    Ok(HttpResponse::Ok().json(OrderResult::from(order)))
}

route!(confirm_delivery_rate => Post "/order/confirm-delivery-rate" impl MarketplaceDatabase, Gateway);
/// Buyer confirms delivery and rates the seller in one call. Responds 422 for an out-of-range
/// rating and 409 if the rating was already set.
pub async fn confirm_delivery_rate<B, G>(
    claims: JwtClaims,
    body: web::Json<DeliveryRatingRequest>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: MarketplaceDatabase,
    G: Gateway,
{
    let params = body.into_inner();
    let oid = OrderId::from(params.order_id);
    debug!("💻️ POST confirm_delivery_rate for {oid} by {} ({} stars)", claims.user_id(), params.rating);
    let order = api.confirm_delivery_and_rate(&oid, claims.user_id(), params.rating, params.comment).await?;
    Ok(HttpResponse::Ok().json(OrderResult::from(order)))
}

//----------------------------------------------   Order reads  ----------------------------------------------------

route!(buy_order => Get "/order/buy/{order_id}" impl MarketplaceDatabase);
pub async fn buy_order<B: MarketplaceDatabase>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let oid = OrderId::from(path.into_inner());
    debug!("💻️ GET buy_order {oid} for {}", claims.user_id());
    let order = api.fetch_buy_order(&oid, claims.user_id()).await?;
    Ok(HttpResponse::Ok().json(OrderResult::from(order)))
}

route!(sell_order => Get "/order/sell/{order_id}" impl MarketplaceDatabase);
pub async fn sell_order<B: MarketplaceDatabase>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let oid = OrderId::from(path.into_inner());
    debug!("💻️ GET sell_order {oid} for {}", claims.user_id());
    let order = api.fetch_sell_order(&oid, claims.user_id()).await?;
    Ok(HttpResponse::Ok().json(OrderResult::from(order)))
}

route!(latest_buy_orders => Get "/order/latest-buy-orders" impl MarketplaceDatabase);
pub async fn latest_buy_orders<B: MarketplaceDatabase>(
    claims: JwtClaims,
    query: web::Query<Pagination>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET latest_buy_orders for {}", claims.user_id());
    let orders = api.latest_buy_orders(claims.user_id(), &query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(latest_sell_orders => Get "/order/latest-sell-orders" impl MarketplaceDatabase);
pub async fn latest_sell_orders<B: MarketplaceDatabase>(
    claims: JwtClaims,
    query: web::Query<Pagination>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET latest_sell_orders for {}", claims.user_id());
    let orders = api.latest_sell_orders(claims.user_id(), &query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(orders))
}

//----------------------------------------------   Items  ----------------------------------------------------

route!(item_create => Post "/item/create" impl MarketplaceDatabase, Gateway);
/// Lists a new item for sale on behalf of the authenticated seller.
pub async fn item_create<B, G>(
    claims: JwtClaims,
    body: web::Json<CreateItemRequest>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: MarketplaceDatabase,
    G: Gateway,
{
    let params = body.into_inner();
    if params.price <= 0 {
        return Err(ServerError::ValidationError("Item price must be positive".to_string()));
    }
    let price = Price::from_units(params.price);
    let item = match params.item_id {
        Some(id) => NewItem::with_id(&id, claims.user_id(), price),
        None => NewItem::new(claims.user_id(), price),
    };
    debug!("💻️ POST item_create {} by {}", item.item_id, claims.user_id());
    let item = api.db().insert_item(item).await?;
    Ok(HttpResponse::build(StatusCode::CREATED).json(item))
}

use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::order_objects::{OrderQueryFilter, Pagination},
    db_types::{NewOrder, Order, OrderId, Rating},
    traits::OrderFlowError,
};

/// Inserts a new pending order using the given connection. Can be embedded in a transaction by
/// passing `&mut *tx` as the connection argument.
///
/// Plain-connection writes in this module avoid `RETURNING`: the streamed row comes back before
/// SQLite's implicit write transaction commits, so a caller hopping to a fresh pool connection
/// for its next statement could miss the write. Execute first, then re-read.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let oid = order.order_id.clone();
    sqlx::query(
        r#"
            INSERT INTO orders (
                order_id,
                item_id,
                buyer_id,
                seller_id,
                price,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6);
        "#,
    )
    .bind(order.order_id)
    .bind(order.item_id)
    .bind(order.buyer_id)
    .bind(order.seller_id)
    .bind(order.price.value())
    .bind(order.created_at)
    .execute(&mut *conn)
    .await?;
    let order: Order = sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(oid.as_str()).fetch_one(conn).await?;
    debug!("📝️ Order [{}] inserted with id {}", order.order_id, order.id);
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_checkout_session(
    session_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE checkout_session_id = $1")
        .bind(session_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Returns the order holding the settled payment for the item, if one exists. The partial unique
/// index on `(item_id) WHERE payment_status = 'Paid'` guarantees at most one row.
pub async fn fetch_paid_order_for_item(
    item_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE item_id = $1 AND payment_status = 'Paid'")
        .bind(item_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Records the checkout session for a freshly created order. The session id is immutable: the
/// update only matches rows where no session is attached yet.
pub async fn attach_checkout_session(
    order_id: &OrderId,
    session_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let result = sqlx::query(
        "UPDATE orders SET checkout_session_id = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 AND \
         checkout_session_id IS NULL",
    )
    .bind(session_id)
    .bind(order_id.as_str())
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    let order = fetch_order_by_order_id(order_id, conn).await?;
    Ok(order)
}

/// Compensation for a failed checkout-session creation. Only a pending order with no session
/// attached may be removed; anything else is permanent audit history.
pub async fn delete_unsettled_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, OrderFlowError> {
    let result = sqlx::query(
        "DELETE FROM orders WHERE order_id = $1 AND state = 'Pending' AND checkout_session_id IS NULL",
    )
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Settles a pending order as paid. Part of the settlement transaction; the caller has already
/// won the item's sold-flag write.
pub(crate) async fn mark_paid(
    order_id: &OrderId,
    payment_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let order = sqlx::query_as(
        "UPDATE orders SET state = 'Paid', payment_status = 'Paid', payment_reference = $1, updated_at = \
         CURRENT_TIMESTAMP WHERE order_id = $2 AND state = 'Pending' AND payment_status = 'Pending' RETURNING *",
    )
    .bind(payment_reference)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Marks the loser of the double-sale race. The payment reference is recorded so the refund
/// engine can reverse the charge.
pub(crate) async fn mark_lost_race(
    order_id: &OrderId,
    payment_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let order = sqlx::query_as(
        "UPDATE orders SET state = 'Refunded', payment_status = 'Refunded', payment_reference = $1, updated_at = \
         CURRENT_TIMESTAMP WHERE order_id = $2 AND state = 'Pending' RETURNING *",
    )
    .bind(payment_reference)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub(crate) async fn mark_as_shipping(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let result = sqlx::query(
        "UPDATE orders SET state = 'Shipping', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND state = 'Paid'",
    )
    .bind(order_id.as_str())
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    let order = fetch_order_by_order_id(order_id, conn).await?;
    Ok(order)
}

/// Cancels an unpaid order. Paid orders go through [`mark_as_refunded`] instead.
pub(crate) async fn mark_as_cancelled(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let result = sqlx::query(
        "UPDATE orders SET state = 'Cancelled', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND state = \
         'Pending' AND payment_status = 'Pending'",
    )
    .bind(order_id.as_str())
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    let order = fetch_order_by_order_id(order_id, conn).await?;
    Ok(order)
}

/// Reverses a settled order on seller cancellation. Part of the refund transaction that also
/// reverts the item's sold flag.
pub(crate) async fn mark_as_refunded(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let order = sqlx::query_as(
        "UPDATE orders SET state = 'Refunded', payment_status = 'Refunded', updated_at = CURRENT_TIMESTAMP WHERE \
         order_id = $1 AND state IN ('Paid', 'Shipping') AND payment_status = 'Paid' RETURNING *",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Completes an order and stores the one-shot rating. The `rating IS NULL` guard makes the
/// rating immutable at the storage level.
pub(crate) async fn complete_with_rating(
    order_id: &OrderId,
    rating: Rating,
    comment: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let order = sqlx::query_as(
        "UPDATE orders SET state = 'Completed', rating = $1, rating_comment = $2, completed_at = CURRENT_TIMESTAMP, \
         updated_at = CURRENT_TIMESTAMP WHERE order_id = $3 AND state IN ('Paid', 'Shipping') AND rating IS NULL \
         RETURNING *",
    )
    .bind(rating.value())
    .bind(comment)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_orders_for_buyer(
    buyer_id: &str,
    pagination: &Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
    )
    .bind(buyer_id)
    .bind(pagination.count())
    .bind(pagination.offset())
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn fetch_orders_for_seller(
    seller_id: &str,
    pagination: &Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE seller_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
    )
    .bind(seller_id)
    .bind(pagination.count())
    .bind(pagination.offset())
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM orders
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.as_str().to_string());
    }
    if let Some(item_id) = query.item_id {
        where_clause.push("item_id = ");
        where_clause.push_bind_unseparated(item_id);
    }
    if let Some(buyer_id) = query.buyer_id {
        where_clause.push("buyer_id = ");
        where_clause.push_bind_unseparated(buyer_id);
    }
    if let Some(seller_id) = query.seller_id {
        where_clause.push("seller_id = ");
        where_clause.push_bind_unseparated(seller_id);
    }
    if query.state.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut states = vec![];
        query.state.as_ref().unwrap().iter().for_each(|s| {
            states.push(format!("'{s}'"));
        });
        let state_clause = states.join(",");
        where_clause.push(format!("state IN ({state_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("📝️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    trace!("Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

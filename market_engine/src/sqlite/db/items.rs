use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Item, NewItem},
    traits::OrderFlowError,
};

// Writes outside the settlement/refund transactions use execute + re-select instead of
// RETURNING: a streamed RETURNING row resolves before SQLite's implicit write transaction
// commits, and callers acquire a fresh pool connection per call, so the next statement could
// miss the write.
pub async fn insert_item(item: NewItem, conn: &mut SqliteConnection) -> Result<Item, OrderFlowError> {
    sqlx::query("INSERT INTO items (item_id, seller_id, price) VALUES ($1, $2, $3)")
        .bind(&item.item_id)
        .bind(&item.seller_id)
        .bind(item.price.value())
        .execute(&mut *conn)
        .await?;
    let item: Item =
        sqlx::query_as("SELECT * FROM items WHERE item_id = $1").bind(&item.item_id).fetch_one(conn).await?;
    debug!("📝️ Item [{}] listed by {}", item.item_id, item.seller_id);
    Ok(item)
}

pub async fn fetch_item(item_id: &str, conn: &mut SqliteConnection) -> Result<Option<Item>, sqlx::Error> {
    let item = sqlx::query_as("SELECT * FROM items WHERE item_id = $1").bind(item_id).fetch_optional(conn).await?;
    Ok(item)
}

/// The compare-and-swap at the heart of the double-sale resolution: flips the sold flag iff it
/// is currently clear. Returns true for the winner. Only ever called inside the settlement
/// transaction.
pub(crate) async fn try_mark_sold(item_id: &str, conn: &mut SqliteConnection) -> Result<bool, OrderFlowError> {
    let result = sqlx::query("UPDATE items SET sold = 1, updated_at = CURRENT_TIMESTAMP WHERE item_id = $1 AND sold = 0")
        .bind(item_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Reverts the sold flag when a paid order is refunded on cancellation.
pub(crate) async fn mark_unsold(item_id: &str, conn: &mut SqliteConnection) -> Result<(), OrderFlowError> {
    sqlx::query("UPDATE items SET sold = 0, updated_at = CURRENT_TIMESTAMP WHERE item_id = $1")
        .bind(item_id)
        .execute(conn)
        .await?;
    Ok(())
}

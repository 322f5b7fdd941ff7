use log::debug;
use sqlx::SqliteConnection;

use crate::{db_types::Rating, traits::OrderFlowError};

/// Adds one rating to the seller's running aggregate. Called inside the completion transaction.
pub(crate) async fn bump_aggregate(
    seller_id: &str,
    rating: Rating,
    conn: &mut SqliteConnection,
) -> Result<(), OrderFlowError> {
    sqlx::query(
        r#"
            INSERT INTO seller_ratings (seller_id, rating_sum, rating_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (seller_id) DO UPDATE SET
                rating_sum = rating_sum + excluded.rating_sum,
                rating_count = rating_count + 1,
                updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(seller_id)
    .bind(rating.value())
    .execute(conn)
    .await?;
    Ok(())
}

/// Reads the stored aggregate. `None` when the seller has no rated, completed orders.
pub async fn average(seller_id: &str, conn: &mut SqliteConnection) -> Result<Option<f64>, OrderFlowError> {
    let row: Option<(i64, i64)> =
        sqlx::query_as("SELECT rating_sum, rating_count FROM seller_ratings WHERE seller_id = $1")
            .bind(seller_id)
            .fetch_optional(conn)
            .await?;
    Ok(row.and_then(|(sum, count)| if count > 0 { Some(sum as f64 / count as f64) } else { None }))
}

/// Rebuilds the aggregate from the orders table. Repair path for the incremental counters.
pub(crate) async fn rebuild(seller_id: &str, conn: &mut SqliteConnection) -> Result<Option<f64>, OrderFlowError> {
    let (sum, count): (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(rating), 0), COUNT(rating) FROM orders WHERE seller_id = $1 AND state = 'Completed' AND \
         rating IS NOT NULL",
    )
    .bind(seller_id)
    .fetch_one(&mut *conn)
    .await?;
    sqlx::query(
        r#"
            INSERT INTO seller_ratings (seller_id, rating_sum, rating_count)
            VALUES ($1, $2, $3)
            ON CONFLICT (seller_id) DO UPDATE SET
                rating_sum = excluded.rating_sum,
                rating_count = excluded.rating_count,
                updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(seller_id)
    .bind(sum)
    .bind(count)
    .execute(conn)
    .await?;
    debug!("📝️ Rebuilt rating aggregate for {seller_id}: sum {sum}, count {count}");
    Ok(if count > 0 { Some(sum as f64 / count as f64) } else { None })
}

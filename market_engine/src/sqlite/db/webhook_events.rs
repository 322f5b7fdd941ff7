use sqlx::SqliteConnection;

use crate::traits::OrderFlowError;

/// Records a webhook event id. Returns true if the event is fresh, false if it has been
/// processed before. Runs inside the settlement transaction, before any state mutation, so a
/// rolled-back settlement also forgets the event id and the redelivery gets a clean retry.
pub(crate) async fn record_event(event_id: &str, conn: &mut SqliteConnection) -> Result<bool, OrderFlowError> {
    let result = sqlx::query("INSERT INTO webhook_events (event_id) VALUES ($1) ON CONFLICT (event_id) DO NOTHING")
        .bind(event_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

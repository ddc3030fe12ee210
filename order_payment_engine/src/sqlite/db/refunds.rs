use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewRefund, Refund},
    traits::DatabaseError,
};

pub async fn insert_refund(refund: NewRefund, conn: &mut SqliteConnection) -> Result<Refund, DatabaseError> {
    let order_id = refund.order_id;
    let result: Refund = sqlx::query_as(
        r#"
            INSERT INTO refunds (order_id, payment_transaction_id, amount, refund_type, reason, initiated_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(refund.order_id)
    .bind(refund.payment_transaction_id)
    .bind(refund.amount)
    .bind(refund.refund_type)
    .bind(refund.reason)
    .bind(refund.initiated_by)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => DatabaseError::RefundInProgress(order_id),
        sqlx::Error::Database(err) if err.is_foreign_key_violation() => DatabaseError::OrderNotFound(order_id),
        _ => DatabaseError::from(e),
    })?;
    debug!("🗃️ Refund #{} of {} recorded for order #{order_id}", result.id, result.amount);
    Ok(result)
}

pub async fn fetch_refund(id: i64, conn: &mut SqliteConnection) -> Result<Option<Refund>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM refunds WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Refund>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM refunds WHERE order_id = $1 ORDER BY id ASC").bind(order_id).fetch_all(conn).await
}

pub(crate) async fn mark_processed(
    id: i64,
    gateway_refund_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Refund>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE refunds SET status = 'processed', gateway_refund_id = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(gateway_refund_id)
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn mark_failed(
    id: i64,
    error_description: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Refund>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE refunds SET status = 'failed', error_description = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(error_description)
    .bind(id)
    .fetch_optional(conn)
    .await
}

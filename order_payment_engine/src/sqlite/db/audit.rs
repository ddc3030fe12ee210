use sqlx::SqliteConnection;

use crate::db_types::{AuditEntry, NewAuditEntry};

pub async fn insert_entry(entry: NewAuditEntry, conn: &mut SqliteConnection) -> Result<AuditEntry, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO audit_log (order_id, gateway_order_id, gateway_payment_id, category, event, actor, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(entry.order_id)
    .bind(entry.gateway_order_id)
    .bind(entry.gateway_payment_id)
    .bind(entry.category)
    .bind(entry.event)
    .bind(entry.actor)
    .bind(entry.details)
    .fetch_one(conn)
    .await
}

pub async fn fetch_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<AuditEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM audit_log WHERE order_id = $1 ORDER BY id ASC").bind(order_id).fetch_all(conn).await
}

pub async fn fetch_for_payment(
    gateway_payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<AuditEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM audit_log WHERE gateway_payment_id = $1 ORDER BY id ASC")
        .bind(gateway_payment_id)
        .fetch_all(conn)
        .await
}

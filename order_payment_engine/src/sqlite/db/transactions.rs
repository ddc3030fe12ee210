use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentTransaction, NewWebhookEvent, PaymentTransaction, WebhookEvent},
    traits::DatabaseError,
};

pub async fn insert_transaction(
    transaction: NewPaymentTransaction,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, sqlx::Error> {
    let result: PaymentTransaction = sqlx::query_as(
        r#"
            INSERT INTO payment_transactions (order_id, gateway_order_id, gateway_payment_id, amount, currency, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(transaction.order_id)
    .bind(transaction.gateway_order_id)
    .bind(transaction.gateway_payment_id)
    .bind(transaction.amount)
    .bind(transaction.currency)
    .bind(transaction.status)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Payment transaction #{} created for gateway order {}", result.id, result.gateway_order_id);
    Ok(result)
}

/// Inserts the transaction unless one already exists for the gateway order id, and returns whichever row is stored.
///
/// The insert is a no-op on conflict, so two callers racing on the same gateway order id cannot both create a row,
/// and neither of them fails.
pub async fn idempotent_insert(
    transaction: NewPaymentTransaction,
    conn: &mut SqliteConnection,
) -> Result<(PaymentTransaction, bool), DatabaseError> {
    let gateway_order_id = transaction.gateway_order_id.clone();
    let inserted: Option<PaymentTransaction> = sqlx::query_as(
        r#"
            INSERT INTO payment_transactions (order_id, gateway_order_id, gateway_payment_id, amount, currency, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (gateway_order_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(transaction.order_id)
    .bind(transaction.gateway_order_id)
    .bind(transaction.gateway_payment_id)
    .bind(transaction.amount)
    .bind(transaction.currency)
    .bind(transaction.status)
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(tx) => {
            debug!("🗃️ Payment transaction #{} created for gateway order {gateway_order_id}", tx.id);
            Ok((tx, true))
        },
        None => {
            trace!("🗃️ Payment transaction for gateway order {gateway_order_id} already exists");
            let existing = fetch_by_gateway_order_id(&gateway_order_id, conn).await?;
            existing.map(|tx| (tx, false)).ok_or_else(|| {
                DatabaseError::DatabaseError(format!(
                    "Transaction for gateway order {gateway_order_id} neither inserted nor found"
                ))
            })
        },
    }
}

pub async fn fetch_by_gateway_order_id(
    gateway_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_transactions WHERE gateway_order_id = $1")
        .bind(gateway_order_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_transactions WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

pub(crate) async fn link_to_order(
    id: i64,
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE payment_transactions SET order_id = $1, version = version + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND order_id IS NULL
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn record_payment_id(
    id: i64,
    gateway_payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE payment_transactions SET
                gateway_payment_id = COALESCE(gateway_payment_id, $1),
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(gateway_payment_id)
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn mark_success(
    id: i64,
    gateway_payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE payment_transactions SET
                status = 'success',
                gateway_payment_id = $1,
                error_code = NULL,
                error_description = NULL,
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status IN ('pending', 'failed')
            RETURNING *;
        "#,
    )
    .bind(gateway_payment_id)
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn mark_failed(
    id: i64,
    error_code: &str,
    error_description: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE payment_transactions SET
                status = 'failed',
                error_code = $1,
                error_description = $2,
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(error_code)
    .bind(error_description)
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// Only the transaction that captured the order's payment is refunded.
pub(crate) async fn mark_refunded(id: i64, conn: &mut SqliteConnection) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE payment_transactions SET status = 'refunded', version = version + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'success'
            RETURNING *;
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn append_webhook_event(
    event: NewWebhookEvent,
    conn: &mut SqliteConnection,
) -> Result<WebhookEvent, DatabaseError> {
    let transaction_id = event.transaction_id;
    let result = sqlx::query_as(
        r#"
            INSERT INTO webhook_events (transaction_id, event_type, gateway_payment_id, raw_payload)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(event.transaction_id)
    .bind(event.event_type)
    .bind(event.gateway_payment_id)
    .bind(event.raw_payload)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_foreign_key_violation() => {
            DatabaseError::TransactionNotFound(transaction_id)
        },
        _ => DatabaseError::from(e),
    })?;
    Ok(result)
}

pub async fn fetch_webhook_events(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookEvent>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM webhook_events WHERE transaction_id = $1 ORDER BY id ASC")
        .bind(transaction_id)
        .fetch_all(conn)
        .await
}

use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, NewOrderItem, NoteVisibility, Order, OrderItem, OrderNote},
    traits::{CaptureDetails, DatabaseError},
};

/// Inserts a new order and its items using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, DatabaseError> {
    let order_number = order.order_number.clone();
    let stored: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                customer_id,
                currency,
                subtotal,
                tax,
                shipping,
                discount,
                total_amount,
                shipping_address
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(order.order_number)
    .bind(order.customer_id)
    .bind(order.currency)
    .bind(order.subtotal)
    .bind(order.tax)
    .bind(order.shipping)
    .bind(order.discount)
    .bind(order.total_amount)
    .bind(sqlx::types::Json(order.shipping_address))
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => DatabaseError::OrderNumberExists(order_number),
        _ => DatabaseError::from(e),
    })?;
    for item in order.items {
        insert_order_item(stored.id, item, &mut *conn).await?;
    }
    debug!("🗃️ Order [{}] inserted with id {}", stored.order_number, stored.id);
    Ok(stored)
}

async fn insert_order_item(
    order_id: i64,
    item: NewOrderItem,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO order_items (order_id, product_id, name, unit_price, quantity, line_total)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(item.product_id)
    .bind(item.name)
    .bind(item.unit_price)
    .bind(item.quantity)
    .bind(item.line_total)
    .fetch_one(conn)
    .await
}

pub async fn fetch_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(conn).await
}

pub async fn fetch_order_by_gateway_order_id(
    gateway_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE gateway_order_id = $1 ORDER BY id DESC LIMIT 1")
        .bind(gateway_order_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC").bind(order_id).fetch_all(conn).await
}

/// Points the order at a new gateway order, guarded by the order version.
pub(crate) async fn set_gateway_order(
    order_id: i64,
    expected_version: i64,
    gateway_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                gateway_order_id = $1,
                gateway_payment_id = NULL,
                gateway_signature = NULL,
                status = 'pending_payment',
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND version = $3
              AND payment_status != 'paid'
              AND status IN ('pending_payment', 'payment_failed')
            RETURNING *;
        "#,
    )
    .bind(gateway_order_id)
    .bind(order_id)
    .bind(expected_version)
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Gateway order {gateway_order_id} attached to order #{order_id}: {}", order.is_some());
    Ok(order)
}

pub(crate) async fn mark_authorized(
    order_id: i64,
    gateway_payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'processing',
                gateway_payment_id = COALESCE(gateway_payment_id, $1),
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'pending_payment' AND payment_status != 'paid'
            RETURNING *;
        "#,
    )
    .bind(gateway_payment_id)
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn mark_paid(
    order_id: i64,
    capture: CaptureDetails,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE orders SET
                payment_status = 'paid',
                status = 'processing',
                gateway_payment_id = $1,
                gateway_signature = COALESCE($2, gateway_signature),
                raw_gateway_payload = $3,
                captured_at = $4,
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $5
              AND payment_status != 'paid'
              AND status IN ('pending_payment', 'processing', 'payment_failed')
            RETURNING *;
        "#,
    )
    .bind(capture.gateway_payment_id)
    .bind(capture.gateway_signature)
    .bind(capture.raw_payload)
    .bind(capture.captured_at)
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn mark_payment_failed(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'payment_failed',
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND payment_status != 'paid' AND status IN ('pending_payment', 'processing')
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn mark_refunded(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'refunded',
                payment_status = 'unpaid',
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND payment_status = 'paid' AND status IN ('processing', 'completed')
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

pub async fn insert_note(
    order_id: i64,
    visibility: NoteVisibility,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<OrderNote, DatabaseError> {
    let note = sqlx::query_as("INSERT INTO order_notes (order_id, visibility, note) VALUES ($1, $2, $3) RETURNING *")
        .bind(order_id)
        .bind(visibility)
        .bind(note)
        .fetch_one(conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(err) if err.is_foreign_key_violation() => DatabaseError::OrderNotFound(order_id),
            _ => DatabaseError::from(e),
        })?;
    Ok(note)
}

pub async fn fetch_notes(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderNote>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_notes WHERE order_id = $1 ORDER BY id ASC").bind(order_id).fetch_all(conn).await
}

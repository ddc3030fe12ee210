use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::db_types::{CartItem, MinorUnits, Product};

pub async fn fetch_products(product_ids: &[i64], conn: &mut SqliteConnection) -> Result<Vec<Product>, sqlx::Error> {
    if product_ids.is_empty() {
        return Ok(vec![]);
    }
    let mut builder = QueryBuilder::new("SELECT id, name, price, sale_price, active FROM products WHERE id IN (");
    let mut ids = builder.separated(", ");
    for id in product_ids {
        ids.push_bind(*id);
    }
    builder.push(") ORDER BY id ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    builder.build_query_as::<Product>().fetch_all(conn).await
}

pub async fn fetch_cart(customer_id: &str, conn: &mut SqliteConnection) -> Result<Vec<CartItem>, sqlx::Error> {
    sqlx::query_as(
        "SELECT customer_id, product_id, quantity FROM cart_items WHERE customer_id = $1 ORDER BY product_id ASC",
    )
    .bind(customer_id)
    .fetch_all(conn)
    .await
}

pub async fn clear_cart(customer_id: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cart_items WHERE customer_id = $1").bind(customer_id).execute(conn).await?;
    Ok(result.rows_affected())
}

/// Adds a product to the catalog. The catalog is managed elsewhere; this is used to seed data.
pub async fn insert_product(
    name: &str,
    price: MinorUnits,
    sale_price: Option<MinorUnits>,
    conn: &mut SqliteConnection,
) -> Result<Product, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO products (name, price, sale_price) VALUES ($1, $2, $3) RETURNING id, name, price, sale_price, active",
    )
    .bind(name)
    .bind(price)
    .bind(sale_price)
    .fetch_one(conn)
    .await
}

pub async fn set_product_active(product_id: i64, active: bool, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE products SET active = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(active)
        .bind(product_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Sets the quantity of a product in the customer's cart. The cart is managed elsewhere; this is used to seed data.
pub async fn set_cart_item(
    customer_id: &str,
    product_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO cart_items (customer_id, product_id, quantity) VALUES ($1, $2, $3)
            ON CONFLICT (customer_id, product_id) DO UPDATE SET quantity = excluded.quantity;
        "#,
    )
    .bind(customer_id)
    .bind(product_id)
    .bind(quantity)
    .execute(conn)
    .await?;
    Ok(())
}

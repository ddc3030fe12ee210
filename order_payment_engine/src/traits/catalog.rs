use crate::{
    db_types::{CartItem, Product},
    traits::DatabaseError,
};

/// Read access to the product catalog, which is the source of truth for prices.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    /// Fetches the products with the given ids. Unknown ids are silently left out of the result.
    async fn fetch_products(&self, product_ids: &[i64]) -> Result<Vec<Product>, DatabaseError>;
}

/// The server-side shopping cart.
#[allow(async_fn_in_trait)]
pub trait CartManagement {
    async fn fetch_cart(&self, customer_id: &str) -> Result<Vec<CartItem>, DatabaseError>;

    /// Empties the customer's cart, returning the number of lines removed. Clearing an empty cart is not an error.
    async fn clear_cart(&self, customer_id: &str) -> Result<u64, DatabaseError>;
}

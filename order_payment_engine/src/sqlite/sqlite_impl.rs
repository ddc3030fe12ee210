//! `SqliteDatabase` is a concrete implementation of a reconciliation engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Multi-row writes run inside a single database transaction. No transaction is ever held open across a call
//! to the payment gateway, since the engine never calls out from here.
use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use super::db::{audit, catalog, db_url, new_pool, orders, refunds, transactions};
use crate::{
    db_types::{
        AuditEntry,
        CartItem,
        MinorUnits,
        NewAuditEntry,
        NewOrder,
        NewPaymentTransaction,
        NewRefund,
        NewWebhookEvent,
        NoteVisibility,
        Order,
        OrderItem,
        OrderNote,
        PaymentTransaction,
        Product,
        Refund,
        WebhookEvent,
    },
    traits::{
        AuditManagement,
        CaptureDetails,
        CartManagement,
        CatalogManagement,
        DatabaseError,
        OrderManagement,
        OrderPaymentDatabase,
        RefundManagement,
        TransactionManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl OrderPaymentDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_number, order.id);
        Ok(order)
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Order>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_gateway_order_id(gateway_order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_order_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn attach_gateway_order(
        &self,
        order_id: i64,
        expected_version: i64,
        transaction: NewPaymentTransaction,
    ) -> Result<Option<(Order, PaymentTransaction)>, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let gateway_order_id = transaction.gateway_order_id.clone();
        let order = orders::set_gateway_order(order_id, expected_version, &gateway_order_id, &mut tx).await?;
        let Some(order) = order else {
            debug!(
                "🗃️ Order #{order_id} is no longer at version {expected_version}, or cannot take a new payment. Gateway \
                 order {gateway_order_id} was not attached."
            );
            tx.rollback().await?;
            return Ok(None);
        };
        let transaction = match transactions::idempotent_insert(transaction, &mut tx).await? {
            (created, true) => created,
            (existing, false) => match existing.order_id {
                None => {
                    debug!(
                        "🗃️ Transaction #{} for gateway order {gateway_order_id} was created by a webhook. Linking it to \
                         order #{order_id}",
                        existing.id
                    );
                    transactions::link_to_order(existing.id, order_id, &mut tx).await?.unwrap_or(existing)
                },
                Some(id) if id == order_id => existing,
                Some(other) => {
                    tx.rollback().await?;
                    return Err(DatabaseError::DatabaseError(format!(
                        "Gateway order {gateway_order_id} already belongs to order #{other}"
                    )));
                },
            },
        };
        tx.commit().await?;
        debug!("🗃️ Order #{order_id} now awaits payment on gateway order {gateway_order_id}");
        Ok(Some((order, transaction)))
    }

    async fn mark_order_authorized(
        &self,
        order_id: i64,
        gateway_payment_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::mark_authorized(order_id, gateway_payment_id, &mut conn).await?;
        trace!("🗃️ Order #{order_id} authorized by {gateway_payment_id}: {}", order.is_some());
        Ok(order)
    }

    async fn mark_order_paid(&self, order_id: i64, capture: CaptureDetails) -> Result<Option<Order>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let payment_id = capture.gateway_payment_id.clone();
        let order = orders::mark_paid(order_id, capture, &mut conn).await?;
        match &order {
            Some(_) => debug!("🗃️ Order #{order_id} marked as paid by {payment_id}"),
            None => debug!("🗃️ Order #{order_id} was not eligible to be marked as paid by {payment_id}"),
        }
        Ok(order)
    }

    async fn mark_order_payment_failed(&self, order_id: i64) -> Result<Option<Order>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::mark_payment_failed(order_id, &mut conn).await?;
        trace!("🗃️ Order #{order_id} marked as payment_failed: {}", order.is_some());
        Ok(order)
    }

    async fn add_order_note(
        &self,
        order_id: i64,
        visibility: NoteVisibility,
        note: &str,
    ) -> Result<OrderNote, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_note(order_id, visibility, note, &mut conn).await
    }

    async fn fetch_order_notes(&self, order_id: i64) -> Result<Vec<OrderNote>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let notes = orders::fetch_notes(order_id, &mut conn).await?;
        Ok(notes)
    }
}

impl TransactionManagement for SqliteDatabase {
    async fn insert_transaction(
        &self,
        transaction: NewPaymentTransaction,
    ) -> Result<PaymentTransaction, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let transaction = transactions::insert_transaction(transaction, &mut conn).await?;
        Ok(transaction)
    }

    async fn fetch_or_create_transaction(
        &self,
        transaction: NewPaymentTransaction,
    ) -> Result<(PaymentTransaction, bool), DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        transactions::idempotent_insert(transaction, &mut conn).await
    }

    async fn fetch_transaction_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let transaction = transactions::fetch_by_gateway_order_id(gateway_order_id, &mut conn).await?;
        Ok(transaction)
    }

    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<PaymentTransaction>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::fetch_for_order(order_id, &mut conn).await?;
        Ok(result)
    }

    async fn link_transaction_to_order(
        &self,
        transaction_id: i64,
        order_id: i64,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::link_to_order(transaction_id, order_id, &mut conn).await?;
        Ok(result)
    }

    async fn record_transaction_payment_id(
        &self,
        transaction_id: i64,
        gateway_payment_id: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::record_payment_id(transaction_id, gateway_payment_id, &mut conn).await?;
        Ok(result)
    }

    async fn mark_transaction_success(
        &self,
        transaction_id: i64,
        gateway_payment_id: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::mark_success(transaction_id, gateway_payment_id, &mut conn).await?;
        trace!("🗃️ Transaction #{transaction_id} marked as success: {}", result.is_some());
        Ok(result)
    }

    async fn mark_transaction_failed(
        &self,
        transaction_id: i64,
        error_code: &str,
        error_description: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::mark_failed(transaction_id, error_code, error_description, &mut conn).await?;
        trace!("🗃️ Transaction #{transaction_id} marked as failed ({error_code}): {}", result.is_some());
        Ok(result)
    }

    async fn append_webhook_event(&self, event: NewWebhookEvent) -> Result<WebhookEvent, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        transactions::append_webhook_event(event, &mut conn).await
    }

    async fn fetch_webhook_events(&self, transaction_id: i64) -> Result<Vec<WebhookEvent>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let events = transactions::fetch_webhook_events(transaction_id, &mut conn).await?;
        Ok(events)
    }
}

impl RefundManagement for SqliteDatabase {
    async fn insert_refund(&self, refund: NewRefund) -> Result<Refund, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        refunds::insert_refund(refund, &mut conn).await
    }

    async fn fetch_refund(&self, refund_id: i64) -> Result<Option<Refund>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let refund = refunds::fetch_refund(refund_id, &mut conn).await?;
        Ok(refund)
    }

    async fn fetch_refunds_for_order(&self, order_id: i64) -> Result<Vec<Refund>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let result = refunds::fetch_for_order(order_id, &mut conn).await?;
        Ok(result)
    }

    async fn complete_refund(
        &self,
        refund_id: i64,
        gateway_refund_id: &str,
    ) -> Result<Option<(Refund, Order)>, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let Some(refund) = refunds::mark_processed(refund_id, gateway_refund_id, &mut tx).await? else {
            debug!("🗃️ Refund #{refund_id} is not pending. It cannot be completed.");
            tx.rollback().await?;
            return Ok(None);
        };
        let order_id = refund.order_id;
        // The money has already moved at the gateway, so the refund is recorded even if the order is no longer in a
        // paid state.
        let order = match orders::mark_refunded(order_id, &mut tx).await? {
            Some(order) => order,
            None => {
                warn!("🗃️ Order #{order_id} was not in a paid state when refund #{refund_id} completed");
                orders::fetch_order(order_id, &mut tx).await?.ok_or(DatabaseError::OrderNotFound(order_id))?
            },
        };
        if transactions::mark_refunded(refund.payment_transaction_id, &mut tx).await?.is_none() {
            warn!(
                "🗃️ Transaction #{} was not in 'success' status when refund #{refund_id} completed",
                refund.payment_transaction_id
            );
        }
        tx.commit().await?;
        debug!("🗃️ Refund #{refund_id} completed. Order #{order_id} is now {}", order.status);
        Ok(Some((refund, order)))
    }

    async fn fail_refund(&self, refund_id: i64, error_description: &str) -> Result<Option<Refund>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let refund = refunds::mark_failed(refund_id, error_description, &mut conn).await?;
        Ok(refund)
    }
}

impl AuditManagement for SqliteDatabase {
    async fn insert_audit_entry(&self, entry: NewAuditEntry) -> Result<AuditEntry, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let entry = audit::insert_entry(entry, &mut conn).await?;
        Ok(entry)
    }

    async fn fetch_audit_entries_for_order(&self, order_id: i64) -> Result<Vec<AuditEntry>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let entries = audit::fetch_for_order(order_id, &mut conn).await?;
        Ok(entries)
    }

    async fn fetch_audit_entries_for_payment(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Vec<AuditEntry>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let entries = audit::fetch_for_payment(gateway_payment_id, &mut conn).await?;
        Ok(entries)
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn fetch_products(&self, product_ids: &[i64]) -> Result<Vec<Product>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let products = catalog::fetch_products(product_ids, &mut conn).await?;
        Ok(products)
    }
}

impl CartManagement for SqliteDatabase {
    async fn fetch_cart(&self, customer_id: &str) -> Result<Vec<CartItem>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let cart = catalog::fetch_cart(customer_id, &mut conn).await?;
        Ok(cart)
    }

    async fn clear_cart(&self, customer_id: &str) -> Result<u64, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let removed = catalog::clear_cart(customer_id, &mut conn).await?;
        trace!("🗃️ Removed {removed} items from the cart for customer {customer_id}");
        Ok(removed)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies any outstanding schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), sqlx::Error> {
        self.pool.close().await;
        Ok(())
    }

    /// Adds a product to the catalog.
    pub async fn insert_product(
        &self,
        name: &str,
        price: MinorUnits,
        sale_price: Option<MinorUnits>,
    ) -> Result<Product, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let product = catalog::insert_product(name, price, sale_price, &mut conn).await?;
        Ok(product)
    }

    pub async fn set_product_active(&self, product_id: i64, active: bool) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        catalog::set_product_active(product_id, active, &mut conn).await?;
        Ok(())
    }

    /// Puts `quantity` units of the product in the customer's cart, replacing any previous quantity.
    pub async fn set_cart_item(&self, customer_id: &str, product_id: i64, quantity: i64) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        catalog::set_cart_item(customer_id, product_id, quantity, &mut conn).await?;
        Ok(())
    }
}

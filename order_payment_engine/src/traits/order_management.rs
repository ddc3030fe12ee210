use crate::{
    db_types::{NewOrder, NewPaymentTransaction, NoteVisibility, Order, OrderItem, OrderNote, PaymentTransaction},
    traits::{data_objects::CaptureDetails, DatabaseError},
};

#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Stores a new order, along with its line items, in a single atomic transaction.
    /// The order is created in `pending_payment` / `unpaid` status with version 0.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, DatabaseError>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, DatabaseError>;

    /// Fetches the order whose *current* gateway order id matches the argument.
    async fn fetch_order_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Order>, DatabaseError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, DatabaseError>;

    /// Attaches a freshly opened gateway order to the order, and inserts the matching pending transaction, atomically.
    ///
    /// The order must still be at `expected_version`, unpaid, and in `pending_payment` or `payment_failed`. The order
    /// is (re)set to `pending_payment`. Returns `None` if the version check fails, in which case nothing is written.
    ///
    /// A webhook can arrive before the gateway order is attached, and create the transaction without an order. That
    /// transaction is linked to the order instead of inserting a new one. A transaction that already belongs to a
    /// different order is an error.
    async fn attach_gateway_order(
        &self,
        order_id: i64,
        expected_version: i64,
        transaction: NewPaymentTransaction,
    ) -> Result<Option<(Order, PaymentTransaction)>, DatabaseError>;

    /// Soft transition from `pending_payment` to `processing` for an authorized, but not yet captured, payment.
    /// Records the gateway payment id if none is set. Returns `None` if the order was not in `pending_payment`.
    async fn mark_order_authorized(
        &self,
        order_id: i64,
        gateway_payment_id: &str,
    ) -> Result<Option<Order>, DatabaseError>;

    /// Sets `payment_status=paid`, `status=processing` and stamps the capture details.
    ///
    /// Only an unpaid order in `pending_payment`, `processing` or `payment_failed` is eligible. Exactly one of any
    /// number of concurrent callers receives `Some`; the rest get `None`.
    async fn mark_order_paid(&self, order_id: i64, capture: CaptureDetails) -> Result<Option<Order>, DatabaseError>;

    /// Moves an unpaid order in `pending_payment` or `processing` to `payment_failed`.
    /// A paid order is never moved, and `None` is returned.
    async fn mark_order_payment_failed(&self, order_id: i64) -> Result<Option<Order>, DatabaseError>;

    async fn add_order_note(
        &self,
        order_id: i64,
        visibility: NoteVisibility,
        note: &str,
    ) -> Result<OrderNote, DatabaseError>;

    /// Notes for the order, oldest first.
    async fn fetch_order_notes(&self, order_id: i64) -> Result<Vec<OrderNote>, DatabaseError>;
}

use crate::{
    db_types::{NewRefund, Order, Refund},
    traits::DatabaseError,
};

#[allow(async_fn_in_trait)]
pub trait RefundManagement {
    /// Stores a refund in `pending` status. At most one refund per order may be pending at a time; a second one
    /// fails with [`DatabaseError::RefundInProgress`].
    async fn insert_refund(&self, refund: NewRefund) -> Result<Refund, DatabaseError>;

    async fn fetch_refund(&self, refund_id: i64) -> Result<Option<Refund>, DatabaseError>;

    async fn fetch_refunds_for_order(&self, order_id: i64) -> Result<Vec<Refund>, DatabaseError>;

    /// In a single atomic transaction:
    /// * marks the pending refund as `processed` and records the gateway refund id,
    /// * moves the order from a paid state to `refunded` with `payment_status=unpaid`,
    /// * marks the refunded payment transaction as `refunded`.
    ///
    /// Returns `None` if the refund was not pending. Otherwise the updated refund and the current order are returned.
    async fn complete_refund(
        &self,
        refund_id: i64,
        gateway_refund_id: &str,
    ) -> Result<Option<(Refund, Order)>, DatabaseError>;

    /// Marks a pending refund as `failed`. The order is not touched.
    async fn fail_refund(&self, refund_id: i64, error_description: &str) -> Result<Option<Refund>, DatabaseError>;
}

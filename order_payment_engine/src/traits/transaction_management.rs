use crate::{
    db_types::{NewPaymentTransaction, NewWebhookEvent, PaymentTransaction, WebhookEvent},
    traits::DatabaseError,
};

#[allow(async_fn_in_trait)]
pub trait TransactionManagement {
    /// Inserts a new transaction. Fails if a transaction with the same gateway order id already exists.
    async fn insert_transaction(&self, transaction: NewPaymentTransaction)
        -> Result<PaymentTransaction, DatabaseError>;

    /// Returns the transaction for the gateway order id, creating it from `transaction` if it does not exist yet.
    /// The second value is `true` if the row was created by this call.
    ///
    /// Concurrent callers for the same gateway order id all converge on a single row.
    async fn fetch_or_create_transaction(
        &self,
        transaction: NewPaymentTransaction,
    ) -> Result<(PaymentTransaction, bool), DatabaseError>;

    async fn fetch_transaction_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError>;

    /// All the attempts made to pay for the order, oldest first.
    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<PaymentTransaction>, DatabaseError>;

    /// Links a transaction that was created without an order (e.g. from a webhook) to its order.
    async fn link_transaction_to_order(
        &self,
        transaction_id: i64,
        order_id: i64,
    ) -> Result<Option<PaymentTransaction>, DatabaseError>;

    /// Records the gateway payment id on a pending transaction, without changing its status.
    async fn record_transaction_payment_id(
        &self,
        transaction_id: i64,
        gateway_payment_id: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError>;

    /// `pending` or `failed` to `success`. Returns `None` if the transaction was in any other state.
    async fn mark_transaction_success(
        &self,
        transaction_id: i64,
        gateway_payment_id: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError>;

    /// `pending` to `failed`, recording the error details. Returns `None` if the transaction was not pending.
    async fn mark_transaction_failed(
        &self,
        transaction_id: i64,
        error_code: &str,
        error_description: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError>;

    /// Appends a raw event to the transaction's webhook log. The log is never modified otherwise.
    async fn append_webhook_event(&self, event: NewWebhookEvent) -> Result<WebhookEvent, DatabaseError>;

    /// The webhook log for the transaction, in arrival order.
    async fn fetch_webhook_events(&self, transaction_id: i64) -> Result<Vec<WebhookEvent>, DatabaseError>;
}

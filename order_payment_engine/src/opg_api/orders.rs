use log::*;

use crate::{
    db_types::AuditEntry,
    opg_api::{
        audit::AuditSink,
        errors::PaymentFlowError,
        objects::{OrderSummary, TransactionSummary},
    },
    traits::OrderPaymentDatabase,
};

/// Read-only views of orders for operators and customers.
#[derive(Clone)]
pub struct OrderQueryApi<B> {
    db: B,
    audit: AuditSink<B>,
}

impl<B: Clone> OrderQueryApi<B> {
    pub fn new(db: B) -> Self {
        let audit = AuditSink::new(db.clone());
        Self { db, audit }
    }
}

impl<B: OrderPaymentDatabase> OrderQueryApi<B> {
    /// The order with its items, notes, payment transactions (oldest first) and refunds.
    pub async fn order_summary(&self, order_id: i64) -> Result<OrderSummary, PaymentFlowError> {
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| PaymentFlowError::NotFound(format!("Order {order_id}")))?;
        let items = self.db.fetch_order_items(order_id).await?;
        let notes = self.db.fetch_order_notes(order_id).await?;
        let mut transactions = Vec::new();
        for transaction in self.db.fetch_transactions_for_order(order_id).await? {
            let webhook_event_count = self.db.fetch_webhook_events(transaction.id).await?.len();
            transactions.push(TransactionSummary { transaction, webhook_event_count });
        }
        let refunds = self.db.fetch_refunds_for_order(order_id).await?;
        trace!("🗃️ Summary for order {}: {} transactions, {} refunds", order.order_number, transactions.len(), refunds.len());
        Ok(OrderSummary { order, items, notes, transactions, refunds })
    }

    pub async fn audit_trail(&self, order_id: i64) -> Result<Vec<AuditEntry>, PaymentFlowError> {
        if self.db.fetch_order(order_id).await?.is_none() {
            return Err(PaymentFlowError::NotFound(format!("Order {order_id}")));
        }
        self.audit.entries_for_order(order_id).await
    }
}

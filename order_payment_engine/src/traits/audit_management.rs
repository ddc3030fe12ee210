use crate::{
    db_types::{AuditEntry, NewAuditEntry},
    traits::DatabaseError,
};

#[allow(async_fn_in_trait)]
pub trait AuditManagement {
    async fn insert_audit_entry(&self, entry: NewAuditEntry) -> Result<AuditEntry, DatabaseError>;

    /// Audit entries for the order, oldest first.
    async fn fetch_audit_entries_for_order(&self, order_id: i64) -> Result<Vec<AuditEntry>, DatabaseError>;

    /// Audit entries that reference the gateway payment id, oldest first.
    async fn fetch_audit_entries_for_payment(&self, gateway_payment_id: &str)
        -> Result<Vec<AuditEntry>, DatabaseError>;
}

use log::*;

use crate::{
    db_types::{AuditCategory, AuditEntry, NewAuditEntry},
    opg_api::errors::PaymentFlowError,
    traits::AuditManagement,
};

/// Log target for security-relevant events, so that they can be routed separately from functional logs.
pub const SECURITY_LOG_TARGET: &str = "opg::security";

/// Append-only record of every payment, verification, webhook and refund attempt.
///
/// Recording never fails the caller. If the entry cannot be written, the failure is logged and the operation carries
/// on.
#[derive(Clone)]
pub struct AuditSink<B> {
    db: B,
}

impl<B> AuditSink<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B: AuditManagement> AuditSink<B> {
    pub async fn record(&self, entry: NewAuditEntry) {
        if entry.category == AuditCategory::Security {
            warn!(
                target: SECURITY_LOG_TARGET,
                "🛡️ {} by {} (order: {:?}, gateway order: {:?}, payment: {:?}). {}",
                entry.event,
                entry.actor,
                entry.order_id,
                entry.gateway_order_id,
                entry.gateway_payment_id,
                entry.details.as_deref().unwrap_or_default()
            );
        }
        let event = entry.event.clone();
        match self.db.insert_audit_entry(entry).await {
            Ok(e) => trace!("📜️ Audit entry #{} recorded: {event}", e.id),
            Err(e) => error!("📜️ Could not write audit entry '{event}'. {e}"),
        }
    }

    pub async fn entries_for_order(&self, order_id: i64) -> Result<Vec<AuditEntry>, PaymentFlowError> {
        let entries = self.db.fetch_audit_entries_for_order(order_id).await?;
        Ok(entries)
    }

    pub async fn entries_for_payment(&self, gateway_payment_id: &str) -> Result<Vec<AuditEntry>, PaymentFlowError> {
        let entries = self.db.fetch_audit_entries_for_payment(gateway_payment_id).await?;
        Ok(entries)
    }
}

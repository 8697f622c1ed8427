//! Prometheus metrics for the currency network
//!
//! # Metrics
//!
//! - `network_transfers_total` - Committed transfers, cheques included
//! - `network_rejected_operations_total{kind}` - Rejected operations by error kind
//! - `network_fees_collected_total` - Fees kept by intermediaries
//! - `network_transfer_hops` - Histogram of path lengths
//! - `network_cheques_redeemed_total` - Cashed cheques
//! - `network_limit_updates_total` - Applied credit limit changes
//!
//! Every collector lives in the instance's own registry, so several networks
//! can coexist in one process.

use crate::{transfer::TransferReceipt, Error};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed transfers
    pub transfers_total: IntCounter,

    /// Rejected operations, labelled by error kind
    pub rejected_total: IntCounterVec,

    /// Sum of intermediary fees
    pub fees_collected: IntCounter,

    /// Path length histogram
    pub transfer_hops: Histogram,

    /// Cashed cheques
    pub cheques_redeemed: IntCounter,

    /// Applied limit changes
    pub limit_updates: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("transfers_total", &self.transfers_total.get())
            .field("cheques_redeemed", &self.cheques_redeemed.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transfers_total = IntCounter::new(
            "network_transfers_total",
            "Committed transfers, cheques included",
        )?;
        registry.register(Box::new(transfers_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new(
                "network_rejected_operations_total",
                "Rejected operations by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let fees_collected = IntCounter::new(
            "network_fees_collected_total",
            "Fees kept by intermediaries",
        )?;
        registry.register(Box::new(fees_collected.clone()))?;

        let transfer_hops = Histogram::with_opts(
            HistogramOpts::new("network_transfer_hops", "Histogram of path lengths")
                .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0]),
        )?;
        registry.register(Box::new(transfer_hops.clone()))?;

        let cheques_redeemed =
            IntCounter::new("network_cheques_redeemed_total", "Cashed cheques")?;
        registry.register(Box::new(cheques_redeemed.clone()))?;

        let limit_updates = IntCounter::new(
            "network_limit_updates_total",
            "Applied credit limit changes",
        )?;
        registry.register(Box::new(limit_updates.clone()))?;

        Ok(Self {
            transfers_total,
            rejected_total,
            fees_collected,
            transfer_hops,
            cheques_redeemed,
            limit_updates,
            registry,
        })
    }

    /// Record a committed transfer
    pub fn record_transfer(&self, receipt: &TransferReceipt) {
        self.transfers_total.inc();
        self.fees_collected.inc_by(receipt.total_fee);
        self.transfer_hops.observe(receipt.hops as f64);
    }

    /// Record a cashed cheque
    pub fn record_cheque(&self, receipt: &TransferReceipt) {
        self.cheques_redeemed.inc();
        self.record_transfer(receipt);
    }

    /// Record an applied limit change
    pub fn record_limit_update(&self) {
        self.limit_updates.inc();
    }

    /// Record a rejected operation
    pub fn record_rejection(&self, error: &Error) {
        self.rejected_total.with_label_values(&[error.kind()]).inc();
    }

    /// Rejections recorded for `kind`
    pub fn rejections(&self, kind: &str) -> u64 {
        self.rejected_total.with_label_values(&[kind]).get()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the text exposition format
    pub fn render(&self) -> crate::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Config(format!("metrics output: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;
    use uuid::Uuid;

    fn receipt(total_fee: u64, hops: usize) -> TransferReceipt {
        TransferReceipt {
            transfer_id: Uuid::now_v7(),
            source: Address::from_low_u64(1),
            receiver: Address::from_low_u64(2),
            value: 10,
            total_fee,
            hops,
        }
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transfers_total.get(), 0);
        assert_eq!(metrics.cheques_redeemed.get(), 0);
        // independent registries never collide
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_record_transfer() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transfer(&receipt(3, 3));
        metrics.record_cheque(&receipt(0, 1));
        assert_eq!(metrics.transfers_total.get(), 2);
        assert_eq!(metrics.fees_collected.get(), 3);
        assert_eq!(metrics.cheques_redeemed.get(), 1);
        assert_eq!(metrics.transfer_hops.get_sample_count(), 2);
    }

    #[test]
    fn test_record_rejection() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejection(&Error::EmptyPath);
        metrics.record_rejection(&Error::EmptyPath);
        metrics.record_rejection(&Error::ChequeAlreadyRedeemed);
        assert_eq!(metrics.rejections("empty_path"), 2);
        assert_eq!(metrics.rejections("cheque_already_redeemed"), 1);
        assert_eq!(metrics.rejections("path_gap"), 0);
    }

    #[test]
    fn test_render() {
        let metrics = Metrics::new().unwrap();
        metrics.record_limit_update();
        let text = metrics.render().unwrap();
        assert!(text.contains("network_limit_updates_total 1"));
    }
}

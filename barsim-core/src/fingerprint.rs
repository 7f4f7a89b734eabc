//! Run fingerprinting: a content hash of everything a run produced.
//!
//! Two runs over identical data and configuration must yield identical
//! fingerprints. The hash covers account fills, benchmark fills and final
//! ledger snapshots, serialized as canonical JSON (struct field order, ordered
//! maps) and hashed with blake3.

use crate::domain::Fill;
use crate::engine::report::LedgerSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded blake3 digest of a run's outputs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunFingerprint(pub String);

#[derive(Serialize)]
struct FingerprintInput<'a> {
    fills: &'a [Fill],
    benchmark_fills: &'a [Fill],
    final_account: &'a LedgerSnapshot,
    final_benchmark: Option<&'a LedgerSnapshot>,
}

impl RunFingerprint {
    pub fn compute(
        fills: &[Fill],
        benchmark_fills: &[Fill],
        final_account: &LedgerSnapshot,
        final_benchmark: Option<&LedgerSnapshot>,
    ) -> Self {
        let input = FingerprintInput {
            fills,
            benchmark_fills,
            final_account,
            final_benchmark,
        };
        // Plain data with string keys; serialization cannot fail.
        let json = serde_json::to_vec(&input).unwrap_or_default();
        Self::from_bytes(&json)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines and file names.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for RunFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FillId, OrderId, PositionEffect, Side};
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    fn snapshot(cash: f64) -> LedgerSnapshot {
        LedgerSnapshot {
            timestamp: ts(),
            cash,
            market_value: 0.0,
            total_value: cash,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            total_commission: 0.0,
            total_tax: 0.0,
            positions: vec![],
        }
    }

    fn fill(price: f64) -> Fill {
        Fill::new(
            FillId(1),
            Some(OrderId(1)),
            "X".into(),
            Side::Buy,
            PositionEffect::Open,
            ts(),
            price,
            100.0,
            0.0,
            0.0,
        )
    }

    #[test]
    fn identical_inputs_hash_identically() {
        let a = RunFingerprint::compute(&[fill(10.0)], &[], &snapshot(1.0), None);
        let b = RunFingerprint::compute(&[fill(10.0)], &[], &snapshot(1.0), None);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn any_difference_changes_the_hash() {
        let base = RunFingerprint::compute(&[fill(10.0)], &[], &snapshot(1.0), None);
        assert_ne!(
            base,
            RunFingerprint::compute(&[fill(10.01)], &[], &snapshot(1.0), None)
        );
        assert_ne!(
            base,
            RunFingerprint::compute(&[fill(10.0)], &[], &snapshot(2.0), None)
        );
        assert_ne!(
            base,
            RunFingerprint::compute(&[fill(10.0)], &[], &snapshot(1.0), Some(&snapshot(1.0)))
        );
    }
}

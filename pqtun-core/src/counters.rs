//! Process-wide counters and timing histograms (spec §3.6).
//!
//! Every field is a plain atomic so the hot path can update it without
//! ever awaiting while holding a lock — the same split the teacher uses
//! between `tokio::sync::RwLock` for mutable session state and raw
//! atomics for the replay window's accept/reject counts
//! (`nyx-stream/src/replay_protection.rs`).

use crate::error::DropReason;
use crate::types::TimestampMs;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A single counter bumped from one or more threads without synchronization
/// beyond the atomic itself.
#[derive(Debug, Default)]
struct Counter(AtomicU64);

impl Counter {
    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Running min/sum/max/count for one timed primitive, lock-free.
///
/// `min` starts at `u64::MAX` so the first observation always wins; readers
/// should treat `count == 0` as "no data yet" rather than trusting `min`.
#[derive(Debug, Default)]
pub struct DurationStats {
    count: Counter,
    sum_ns: Counter,
    min_ns: AtomicU64,
    max_ns: Counter,
}

impl DurationStats {
    fn new() -> Self {
        Self {
            count: Counter::default(),
            sum_ns: Counter::default(),
            min_ns: AtomicU64::new(u64::MAX),
            max_ns: Counter::default(),
        }
    }

    pub fn record(&self, d: Duration) {
        let ns = d.as_nanos().min(u128::from(u64::MAX)) as u64;
        self.count.add(1);
        self.sum_ns.add(ns);
        self.max_ns.0.fetch_max(ns, Ordering::Relaxed);
        self.min_ns.fetch_min(ns, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DurationStatsSnapshot {
        let count = self.count.get();
        let min_ns = self.min_ns.load(Ordering::Relaxed);
        DurationStatsSnapshot {
            count,
            avg_ms: if count > 0 {
                (self.sum_ns.get() as f64 / count as f64) / 1_000_000.0
            } else {
                0.0
            },
            min_ms: if count > 0 {
                min_ns as f64 / 1_000_000.0
            } else {
                0.0
            },
            max_ms: self.max_ns.get() as f64 / 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DurationStatsSnapshot {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Timing histograms for the primitives spec §3.6 names: "encrypt duration,
/// decrypt success/fail durations, handshake total, KEM/signature
/// breakdowns".
#[derive(Debug, Default)]
pub struct Timings {
    pub encrypt: DurationStats,
    pub decrypt_ok: DurationStats,
    pub decrypt_fail: DurationStats,
    pub handshake_total: DurationStats,
    pub kem_keygen: DurationStats,
    pub kem_encaps: DurationStats,
    pub kem_decaps: DurationStats,
    pub sig_sign: DurationStats,
    pub sig_verify: DurationStats,
}

impl Timings {
    fn new() -> Self {
        Self {
            encrypt: DurationStats::new(),
            decrypt_ok: DurationStats::new(),
            decrypt_fail: DurationStats::new(),
            handshake_total: DurationStats::new(),
            kem_keygen: DurationStats::new(),
            kem_encaps: DurationStats::new(),
            kem_decaps: DurationStats::new(),
            sig_sign: DurationStats::new(),
            sig_verify: DurationStats::new(),
        }
    }
}

/// Per-role process-wide counters (spec §3.6).
#[derive(Debug)]
pub struct Counters {
    pub plaintext_in_packets: Counter,
    pub plaintext_in_bytes: Counter,
    pub plaintext_out_packets: Counter,
    pub plaintext_out_bytes: Counter,
    pub encrypted_in_packets: Counter,
    pub encrypted_in_bytes: Counter,
    pub encrypted_out_packets: Counter,
    pub encrypted_out_bytes: Counter,

    pub drop_header: Counter,
    pub drop_session_epoch: Counter,
    pub drop_replay: Counter,
    pub drop_auth: Counter,
    pub drop_src_addr: Counter,
    pub drop_other: Counter,

    pub rekeys_ok: Counter,
    pub rekeys_fail: Counter,
    /// Distinct from `rekeys_ok`: counts suite *changes* specifically,
    /// which operators watch separately from overall rekey success rate
    /// (SPEC_FULL §3: supplemental field, grounded in the original
    /// dashboard's handling of `auto/gcs_scheduler.py` suite-switch events).
    pub suite_switches: Counter,

    last_rekey_ms: AtomicU64,
    started_at_ms: AtomicU64,

    pub timings: Timings,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    pub fn new() -> Self {
        Self {
            plaintext_in_packets: Counter::default(),
            plaintext_in_bytes: Counter::default(),
            plaintext_out_packets: Counter::default(),
            plaintext_out_bytes: Counter::default(),
            encrypted_in_packets: Counter::default(),
            encrypted_in_bytes: Counter::default(),
            encrypted_out_packets: Counter::default(),
            encrypted_out_bytes: Counter::default(),
            drop_header: Counter::default(),
            drop_session_epoch: Counter::default(),
            drop_replay: Counter::default(),
            drop_auth: Counter::default(),
            drop_src_addr: Counter::default(),
            drop_other: Counter::default(),
            rekeys_ok: Counter::default(),
            rekeys_fail: Counter::default(),
            suite_switches: Counter::default(),
            last_rekey_ms: AtomicU64::new(0),
            started_at_ms: AtomicU64::new(TimestampMs::now().0),
            timings: Timings::new(),
        }
    }

    pub fn record_plaintext_in(&self, bytes: usize) {
        self.plaintext_in_packets.add(1);
        self.plaintext_in_bytes.add(bytes as u64);
    }
    pub fn record_plaintext_out(&self, bytes: usize) {
        self.plaintext_out_packets.add(1);
        self.plaintext_out_bytes.add(bytes as u64);
    }
    pub fn record_encrypted_in(&self, bytes: usize) {
        self.encrypted_in_packets.add(1);
        self.encrypted_in_bytes.add(bytes as u64);
    }
    pub fn record_encrypted_out(&self, bytes: usize) {
        self.encrypted_out_packets.add(1);
        self.encrypted_out_bytes.add(bytes as u64);
    }

    pub fn record_drop(&self, reason: DropReason) {
        match reason {
            DropReason::Header => self.drop_header.add(1),
            DropReason::SessionEpoch => self.drop_session_epoch.add(1),
            DropReason::Replay => self.drop_replay.add(1),
            DropReason::Auth => self.drop_auth.add(1),
            DropReason::SrcAddr => self.drop_src_addr.add(1),
            DropReason::Other => self.drop_other.add(1),
        }
    }

    pub fn record_rekey_ok(&self, suite_changed: bool) {
        self.rekeys_ok.add(1);
        if suite_changed {
            self.suite_switches.add(1);
        }
        self.last_rekey_ms.store(TimestampMs::now().0, Ordering::Relaxed);
    }

    pub fn record_rekey_fail(&self) {
        self.rekeys_fail.add(1);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            plaintext_in_packets: self.plaintext_in_packets.get(),
            plaintext_in_bytes: self.plaintext_in_bytes.get(),
            plaintext_out_packets: self.plaintext_out_packets.get(),
            plaintext_out_bytes: self.plaintext_out_bytes.get(),
            encrypted_in_packets: self.encrypted_in_packets.get(),
            encrypted_in_bytes: self.encrypted_in_bytes.get(),
            encrypted_out_packets: self.encrypted_out_packets.get(),
            encrypted_out_bytes: self.encrypted_out_bytes.get(),
            drop_header: self.drop_header.get(),
            drop_session_epoch: self.drop_session_epoch.get(),
            drop_replay: self.drop_replay.get(),
            drop_auth: self.drop_auth.get(),
            drop_src_addr: self.drop_src_addr.get(),
            drop_other: self.drop_other.get(),
            rekeys_ok: self.rekeys_ok.get(),
            rekeys_fail: self.rekeys_fail.get(),
            suite_switches: self.suite_switches.get(),
            last_rekey: TimestampMs(self.last_rekey_ms.load(Ordering::Relaxed)),
            started_at: TimestampMs(self.started_at_ms.load(Ordering::Relaxed)),
            encrypt: self.timings.encrypt.snapshot(),
            decrypt_ok: self.timings.decrypt_ok.snapshot(),
            decrypt_fail: self.timings.decrypt_fail.snapshot(),
            handshake_total: self.timings.handshake_total.snapshot(),
            kem_keygen: self.timings.kem_keygen.snapshot(),
            kem_encaps: self.timings.kem_encaps.snapshot(),
            kem_decaps: self.timings.kem_decaps.snapshot(),
            sig_sign: self.timings.sig_sign.snapshot(),
            sig_verify: self.timings.sig_verify.snapshot(),
        }
    }
}

/// Serializable point-in-time view of [`Counters`], used by the status
/// file writer (spec §6.4) and the `{"cmd":"status"}` control response
/// (spec §6.3).
#[derive(Debug, Clone, Serialize)]
pub struct CountersSnapshot {
    pub plaintext_in_packets: u64,
    pub plaintext_in_bytes: u64,
    pub plaintext_out_packets: u64,
    pub plaintext_out_bytes: u64,
    pub encrypted_in_packets: u64,
    pub encrypted_in_bytes: u64,
    pub encrypted_out_packets: u64,
    pub encrypted_out_bytes: u64,
    pub drop_header: u64,
    pub drop_session_epoch: u64,
    pub drop_replay: u64,
    pub drop_auth: u64,
    pub drop_src_addr: u64,
    pub drop_other: u64,
    pub rekeys_ok: u64,
    pub rekeys_fail: u64,
    pub suite_switches: u64,
    pub last_rekey: TimestampMs,
    pub started_at: TimestampMs,
    pub encrypt: DurationStatsSnapshot,
    pub decrypt_ok: DurationStatsSnapshot,
    pub decrypt_fail: DurationStatsSnapshot,
    pub handshake_total: DurationStatsSnapshot,
    pub kem_keygen: DurationStatsSnapshot,
    pub kem_encaps: DurationStatsSnapshot,
    pub kem_decaps: DurationStatsSnapshot,
    pub sig_sign: DurationStatsSnapshot,
    pub sig_verify: DurationStatsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_counters_route_to_the_right_field() {
        let c = Counters::new();
        c.record_drop(DropReason::Replay);
        c.record_drop(DropReason::Replay);
        c.record_drop(DropReason::Auth);
        let snap = c.snapshot();
        assert_eq!(snap.drop_replay, 2);
        assert_eq!(snap.drop_auth, 1);
        assert_eq!(snap.drop_header, 0);
    }

    #[test]
    fn rekey_ok_bumps_suite_switches_only_when_suite_changed() {
        let c = Counters::new();
        c.record_rekey_ok(false);
        c.record_rekey_ok(true);
        let snap = c.snapshot();
        assert_eq!(snap.rekeys_ok, 2);
        assert_eq!(snap.suite_switches, 1);
    }

    #[test]
    fn duration_stats_track_min_max_avg() {
        let stats = DurationStats::new();
        stats.record(Duration::from_millis(10));
        stats.record(Duration::from_millis(30));
        let snap = stats.snapshot();
        assert_eq!(snap.count, 2);
        assert!((snap.avg_ms - 20.0).abs() < 0.001);
        assert!((snap.min_ms - 10.0).abs() < 0.001);
        assert!((snap.max_ms - 30.0).abs() < 0.001);
    }

    #[test]
    fn duration_stats_with_no_observations_report_zero() {
        let stats = DurationStats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.min_ms, 0.0);
        assert_eq!(snap.max_ms, 0.0);
    }
}

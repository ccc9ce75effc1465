//! Prometheus exporter over [`pqtun_core::CountersSnapshot`].
//!
//! Grounded in the teacher's `nyx-telemetry` registry-plus-lazy-map
//! pattern, but pull-based rather than incremental: `pqtun_core::Counters`
//! already holds the authoritative atomics, so this exporter just mirrors
//! a point-in-time snapshot into gauges on each scrape instead of
//! duplicating bookkeeping.

use pqtun_core::counters::{CountersSnapshot, DurationStatsSnapshot};
use prometheus::{Encoder, Gauge, IntGauge, Registry, TextEncoder};

macro_rules! int_gauge {
    ($registry:expr, $name:literal, $help:literal) => {{
        let g = IntGauge::new($name, $help).expect("valid metric name/help");
        $registry.register(Box::new(g.clone())).expect("unique metric name");
        g
    }};
}

macro_rules! gauge {
    ($registry:expr, $name:literal, $help:literal) => {{
        let g = Gauge::new($name, $help).expect("valid metric name/help");
        $registry.register(Box::new(g.clone())).expect("unique metric name");
        g
    }};
}

struct DurationGauges {
    count: IntGauge,
    avg_ms: Gauge,
    min_ms: Gauge,
    max_ms: Gauge,
}

impl DurationGauges {
    fn new(registry: &Registry, prefix: &str) -> Self {
        Self {
            count: IntGauge::new(format!("{prefix}_count"), format!("{prefix} observation count"))
                .map(|g| {
                    registry.register(Box::new(g.clone())).expect("unique metric name");
                    g
                })
                .expect("valid metric name"),
            avg_ms: Gauge::new(format!("{prefix}_avg_ms"), format!("{prefix} average, ms"))
                .map(|g| {
                    registry.register(Box::new(g.clone())).expect("unique metric name");
                    g
                })
                .expect("valid metric name"),
            min_ms: Gauge::new(format!("{prefix}_min_ms"), format!("{prefix} minimum, ms"))
                .map(|g| {
                    registry.register(Box::new(g.clone())).expect("unique metric name");
                    g
                })
                .expect("valid metric name"),
            max_ms: Gauge::new(format!("{prefix}_max_ms"), format!("{prefix} maximum, ms"))
                .map(|g| {
                    registry.register(Box::new(g.clone())).expect("unique metric name");
                    g
                })
                .expect("valid metric name"),
        }
    }

    fn set(&self, snap: &DurationStatsSnapshot) {
        self.count.set(snap.count as i64);
        self.avg_ms.set(snap.avg_ms);
        self.min_ms.set(snap.min_ms);
        self.max_ms.set(snap.max_ms);
    }
}

/// Holds one registered gauge per [`CountersSnapshot`] field. `update`
/// is cheap and may be called on every scrape (or every status-file
/// tick, sharing the same snapshot).
pub struct MetricsExporter {
    registry: Registry,

    plaintext_in_packets: IntGauge,
    plaintext_in_bytes: IntGauge,
    plaintext_out_packets: IntGauge,
    plaintext_out_bytes: IntGauge,
    encrypted_in_packets: IntGauge,
    encrypted_in_bytes: IntGauge,
    encrypted_out_packets: IntGauge,
    encrypted_out_bytes: IntGauge,

    drop_header: IntGauge,
    drop_session_epoch: IntGauge,
    drop_replay: IntGauge,
    drop_auth: IntGauge,
    drop_src_addr: IntGauge,
    drop_other: IntGauge,

    rekeys_ok: IntGauge,
    rekeys_fail: IntGauge,
    suite_switches: IntGauge,

    encrypt: DurationGauges,
    decrypt_ok: DurationGauges,
    decrypt_fail: DurationGauges,
    handshake_total: DurationGauges,
    kem_keygen: DurationGauges,
    kem_encaps: DurationGauges,
    kem_decaps: DurationGauges,
    sig_sign: DurationGauges,
    sig_verify: DurationGauges,
}

impl Default for MetricsExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsExporter {
    pub fn new() -> Self {
        let registry = Registry::new();
        Self {
            plaintext_in_packets: int_gauge!(registry, "pqtun_plaintext_in_packets", "plaintext packets received"),
            plaintext_in_bytes: int_gauge!(registry, "pqtun_plaintext_in_bytes", "plaintext bytes received"),
            plaintext_out_packets: int_gauge!(registry, "pqtun_plaintext_out_packets", "plaintext packets delivered"),
            plaintext_out_bytes: int_gauge!(registry, "pqtun_plaintext_out_bytes", "plaintext bytes delivered"),
            encrypted_in_packets: int_gauge!(registry, "pqtun_encrypted_in_packets", "encrypted datagrams received"),
            encrypted_in_bytes: int_gauge!(registry, "pqtun_encrypted_in_bytes", "encrypted bytes received"),
            encrypted_out_packets: int_gauge!(registry, "pqtun_encrypted_out_packets", "encrypted datagrams sent"),
            encrypted_out_bytes: int_gauge!(registry, "pqtun_encrypted_out_bytes", "encrypted bytes sent"),
            drop_header: int_gauge!(registry, "pqtun_drop_header", "packets dropped: bad header"),
            drop_session_epoch: int_gauge!(registry, "pqtun_drop_session_epoch", "packets dropped: session/epoch mismatch"),
            drop_replay: int_gauge!(registry, "pqtun_drop_replay", "packets dropped: replay"),
            drop_auth: int_gauge!(registry, "pqtun_drop_auth", "packets dropped: AEAD auth failure"),
            drop_src_addr: int_gauge!(registry, "pqtun_drop_src_addr", "packets dropped: source address mismatch"),
            drop_other: int_gauge!(registry, "pqtun_drop_other", "packets dropped: other"),
            rekeys_ok: int_gauge!(registry, "pqtun_rekeys_ok", "successful rekeys"),
            rekeys_fail: int_gauge!(registry, "pqtun_rekeys_fail", "failed rekeys"),
            suite_switches: int_gauge!(registry, "pqtun_suite_switches", "rekeys that changed suite"),
            encrypt: DurationGauges::new(&registry, "pqtun_encrypt"),
            decrypt_ok: DurationGauges::new(&registry, "pqtun_decrypt_ok"),
            decrypt_fail: DurationGauges::new(&registry, "pqtun_decrypt_fail"),
            handshake_total: DurationGauges::new(&registry, "pqtun_handshake_total"),
            kem_keygen: DurationGauges::new(&registry, "pqtun_kem_keygen"),
            kem_encaps: DurationGauges::new(&registry, "pqtun_kem_encaps"),
            kem_decaps: DurationGauges::new(&registry, "pqtun_kem_decaps"),
            sig_sign: DurationGauges::new(&registry, "pqtun_sig_sign"),
            sig_verify: DurationGauges::new(&registry, "pqtun_sig_verify"),
            registry,
        }
    }

    pub fn update(&self, snap: &CountersSnapshot) {
        self.plaintext_in_packets.set(snap.plaintext_in_packets as i64);
        self.plaintext_in_bytes.set(snap.plaintext_in_bytes as i64);
        self.plaintext_out_packets.set(snap.plaintext_out_packets as i64);
        self.plaintext_out_bytes.set(snap.plaintext_out_bytes as i64);
        self.encrypted_in_packets.set(snap.encrypted_in_packets as i64);
        self.encrypted_in_bytes.set(snap.encrypted_in_bytes as i64);
        self.encrypted_out_packets.set(snap.encrypted_out_packets as i64);
        self.encrypted_out_bytes.set(snap.encrypted_out_bytes as i64);
        self.drop_header.set(snap.drop_header as i64);
        self.drop_session_epoch.set(snap.drop_session_epoch as i64);
        self.drop_replay.set(snap.drop_replay as i64);
        self.drop_auth.set(snap.drop_auth as i64);
        self.drop_src_addr.set(snap.drop_src_addr as i64);
        self.drop_other.set(snap.drop_other as i64);
        self.rekeys_ok.set(snap.rekeys_ok as i64);
        self.rekeys_fail.set(snap.rekeys_fail as i64);
        self.suite_switches.set(snap.suite_switches as i64);
        self.encrypt.set(&snap.encrypt);
        self.decrypt_ok.set(&snap.decrypt_ok);
        self.decrypt_fail.set(&snap.decrypt_fail);
        self.handshake_total.set(&snap.handshake_total);
        self.kem_keygen.set(&snap.kem_keygen);
        self.kem_encaps.set(&snap.kem_encaps);
        self.kem_decaps.set(&snap.kem_decaps);
        self.sig_sign.set(&snap.sig_sign);
        self.sig_verify.set(&snap.sig_verify);
    }

    /// Renders the current gauge values in Prometheus text exposition
    /// format, for a `/metrics` scrape.
    pub fn render(&self) -> String {
        let mf = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&mf, &mut buf).expect("prometheus text encoding never fails for gauges");
        String::from_utf8(buf).expect("prometheus text encoder emits utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pqtun_core::Counters;

    #[test]
    fn update_then_render_reflects_the_snapshot() {
        let counters = Counters::new();
        counters.record_plaintext_in(100);
        counters.record_drop(pqtun_core::DropReason::Replay);

        let exporter = MetricsExporter::new();
        exporter.update(&counters.snapshot());
        let rendered = exporter.render();

        assert!(rendered.contains("pqtun_plaintext_in_packets 1"));
        assert!(rendered.contains("pqtun_drop_replay 1"));
    }
}

//! Per-IP token-bucket rate limiting for inbound TCP handshake connects
//! (spec §4.2.2, §4.4.4).

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// A per-source-IP token bucket, pruned periodically so long-lived
/// daemons don't accumulate one bucket per drive-by scanner forever.
pub struct HandshakeRateLimiter {
    burst: f64,
    refill_per_s: f64,
    idle_ttl: Duration,
    buckets: HashMap<IpAddr, Bucket>,
    last_prune: Instant,
    prune_interval: Duration,
}

impl HandshakeRateLimiter {
    pub fn new(burst: u32, refill_per_s: f64, prune_interval: Duration, idle_ttl: Duration) -> Self {
        Self {
            burst: burst as f64,
            refill_per_s,
            idle_ttl,
            buckets: HashMap::new(),
            last_prune: Instant::now(),
            prune_interval,
        }
    }

    /// Returns `true` if a connect attempt from `ip` is allowed right now,
    /// consuming one token if so.
    pub fn allow(&mut self, ip: IpAddr) -> bool {
        self.maybe_prune();

        let now = Instant::now();
        let burst = self.burst;
        let refill_per_s = self.refill_per_s;
        let bucket = self.buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: burst,
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_per_s).min(burst);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn maybe_prune(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_prune) < self.prune_interval {
            return;
        }
        self.last_prune = now;
        let idle_ttl = self.idle_ttl;
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_seen) < idle_ttl);
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, n))
    }

    #[test]
    fn allows_up_to_burst_then_blocks() {
        let mut rl = HandshakeRateLimiter::new(5, 1.0, Duration::from_secs(60), Duration::from_secs(600));
        for _ in 0..5 {
            assert!(rl.allow(ip(1)));
        }
        assert!(!rl.allow(ip(1)));
    }

    #[test]
    fn buckets_are_independent_per_ip() {
        let mut rl = HandshakeRateLimiter::new(1, 1.0, Duration::from_secs(60), Duration::from_secs(600));
        assert!(rl.allow(ip(1)));
        assert!(!rl.allow(ip(1)));
        assert!(rl.allow(ip(2)));
    }

    #[test]
    fn pruning_drops_idle_buckets() {
        let mut rl = HandshakeRateLimiter::new(1, 1.0, Duration::from_millis(1), Duration::from_millis(1));
        assert!(rl.allow(ip(1)));
        assert_eq!(rl.bucket_count(), 1);
        std::thread::sleep(Duration::from_millis(5));
        rl.maybe_prune();
        assert_eq!(rl.bucket_count(), 0);
    }
}

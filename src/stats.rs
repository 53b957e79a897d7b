//! Stats & telemetry (C6).
//!
//! Hot-path counters use `std::sync::atomic` the way the teacher's
//! `StreamStats` (`input/stream.rs`) and `AtomicStats` (`output/stream.rs`)
//! do, so incrementing them from the per-packet path never contends with the
//! status-dictionary mutex. Only publishing a snapshot at a block boundary
//! or wall-clock tick takes that lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::status::StatusDictionary;

/// Packet/byte/late counters, reset each time they are snapshotted.
#[derive(Default)]
pub struct NetCounters {
    packets: AtomicU64,
    bytes: AtomicU64,
    drops: AtomicU64,
    late: AtomicU64,
}

impl NetCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet(&self, payload_bytes: u64) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(payload_bytes, Ordering::Relaxed);
    }

    pub fn record_drop(&self, n: u64) {
        self.drops.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_late(&self) {
        self.late.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset the packet/byte pair, leaving the cumulative `late`
    /// counter untouched (it is published cumulatively, per §6 `NLATE`).
    pub fn take_block_snapshot(&self) -> (u64, u64) {
        (
            self.packets.swap(0, Ordering::Relaxed),
            self.bytes.swap(0, Ordering::Relaxed),
        )
    }

    /// Read and reset the packet/byte pair for the wall-clock-second window.
    pub fn take_second_snapshot(&self) -> (u64, u64) {
        self.take_block_snapshot()
    }

    pub fn total_late(&self) -> u64 {
        self.late.load(Ordering::Relaxed)
    }

    pub fn total_drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

/// Bits and packets per second, computed from a snapshot and the elapsed
/// wall-clock interval that snapshot covers.
pub fn rate(packets: u64, bytes: u64, elapsed: Duration) -> (f64, f64) {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return (0.0, 0.0);
    }
    let gbps = (bytes as f64 * 8.0) / secs / 1e9;
    let pkps = packets as f64 / secs;
    (gbps, pkps)
}

/// Fill-to-free moving average over the last `capacity` input slots
/// (`NETBLKMS`).
pub struct FillLatencyTracker {
    samples: std::collections::VecDeque<Duration>,
    capacity: usize,
}

impl FillLatencyTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: std::collections::VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, latency: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    pub fn average_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: Duration = self.samples.iter().sum();
        total.as_secs_f64() * 1000.0 / self.samples.len() as f64
    }
}

/// Publishes `NetCounters` and `FillLatencyTracker` readings to a
/// `StatusDictionary` at the two cadences named in §4.6.
pub struct StatsPublisher {
    counters: NetCounters,
    fill_latency: FillLatencyTracker,
}

impl StatsPublisher {
    pub fn new(n_input_blocks: usize) -> Self {
        Self {
            counters: NetCounters::new(),
            fill_latency: FillLatencyTracker::new(n_input_blocks),
        }
    }

    pub fn counters(&self) -> &NetCounters {
        &self.counters
    }

    pub fn record_fill_latency(&mut self, latency: Duration) {
        self.fill_latency.record(latency);
    }

    /// Publish `NETGBPS`/`NETPKPS` for the interval since the previous block
    /// boundary, plus cumulative `NLATE`/`NDROP` and the fill-latency
    /// average. Called once per block advance.
    pub fn publish_block_boundary(&mut self, dict: &dyn StatusDictionary, elapsed_since_last: Duration) {
        let (packets, bytes) = self.counters.take_block_snapshot();
        let (gbps, pkps) = rate(packets, bytes, elapsed_since_last);
        dict.set_f64("NETGBPS", gbps);
        dict.set_f64("NETPKPS", pkps);
        dict.set_u64("NLATE", self.counters.total_late());
        dict.set_u64("NDROP", self.counters.total_drops());
        dict.set_f64("NETBLKMS", self.fill_latency.average_ms());
    }

    /// Publish `PHYSGBPS`/`PHYSPKPS` for the last wall-clock second. Called
    /// from the ~1 Hz tick.
    pub fn publish_wall_clock_tick(&mut self, dict: &dyn StatusDictionary, elapsed: Duration) {
        let (packets, bytes) = self.counters.take_second_snapshot();
        let (gbps, pkps) = rate(packets, bytes, elapsed);
        dict.set_f64("PHYSGBPS", gbps);
        dict.set_f64("PHYSPKPS", pkps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::InMemoryStatusDictionary;

    #[test]
    fn rate_computes_gbps_and_pkps() {
        // 1 Gbit of payload (125_000_000 bytes) over 1 second -> 1.0 Gbps.
        let (gbps, pkps) = rate(1000, 125_000_000, Duration::from_secs(1));
        assert!((gbps - 1.0).abs() < 1e-9);
        assert!((pkps - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn rate_is_zero_for_zero_elapsed() {
        let (gbps, pkps) = rate(1000, 1000, Duration::from_secs(0));
        assert_eq!(gbps, 0.0);
        assert_eq!(pkps, 0.0);
    }

    #[test]
    fn fill_latency_tracker_drops_oldest_beyond_capacity() {
        let mut tracker = FillLatencyTracker::new(2);
        tracker.record(Duration::from_millis(10));
        tracker.record(Duration::from_millis(20));
        tracker.record(Duration::from_millis(30));
        // Oldest (10ms) dropped; average of 20 and 30 is 25.
        assert!((tracker.average_ms() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn publisher_resets_block_counters_but_keeps_cumulative_late() {
        let dict = InMemoryStatusDictionary::new();
        let mut publisher = StatsPublisher::new(4);
        publisher.counters().record_packet(2048);
        publisher.counters().record_late();
        publisher.publish_block_boundary(&dict, Duration::from_millis(1));

        assert_eq!(dict.get_u64("NLATE"), Some(1));
        let (packets_after, _) = publisher.counters().take_block_snapshot();
        assert_eq!(packets_after, 0);
    }
}

//! Bounded-memory time-travel buffer.
//!
//! Holds one compressed machine snapshot per captured frame, keyed by a
//! monotonically increasing frame number. When the configured byte budget is
//! exceeded the oldest snapshots fall off the front, so the buffer always
//! covers the most recent stretch of the timeline.

use std::collections::VecDeque;
use std::env;

pub const DEFAULT_CAPACITY_BYTES: usize = 512 * 1024 * 1024;

/// Environment variable overriding the default capacity, in bytes.
pub const CAPACITY_ENV_VAR: &str = "RETROSCOPE_STATE_BUFFER_BYTES";

const COMPRESSION_LEVEL: i32 = 0;

#[derive(Debug)]
pub struct SnapshotRecord {
    frame_no: u64,
    bytes: Box<[u8]>,
    uncompressed_len: usize,
}

impl SnapshotRecord {
    #[must_use]
    pub fn frame_no(&self) -> u64 {
        self.frame_no
    }

    #[must_use]
    pub fn compressed_len(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug)]
pub struct StateRing {
    records: VecDeque<SnapshotRecord>,
    total_bytes: usize,
    capacity_bytes: usize,
    paused: bool,
    rolling_paused: bool,
}

impl StateRing {
    #[must_use]
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            records: VecDeque::new(),
            total_bytes: 0,
            capacity_bytes,
            paused: false,
            rolling_paused: false,
        }
    }

    /// Build a ring with the default capacity, honouring
    /// [`CAPACITY_ENV_VAR`] when it holds a positive integer.
    #[must_use]
    pub fn from_env() -> Self {
        let capacity = env::var(CAPACITY_ENV_VAR)
            .ok()
            .and_then(|raw| match raw.trim().parse::<usize>() {
                Ok(bytes) if bytes > 0 => Some(bytes),
                _ => {
                    log::error!("Ignoring invalid {CAPACITY_ENV_VAR} value '{raw}'");
                    None
                }
            })
            .unwrap_or(DEFAULT_CAPACITY_BYTES);

        Self::new(capacity)
    }

    /// Append a snapshot for `frame_no`. Returns whether the snapshot was
    /// stored; a dropped snapshot leaves a gap in the timeline but execution
    /// continues.
    pub fn push(&mut self, frame_no: u64, snapshot: &[u8]) -> bool {
        if self.paused || self.rolling_paused {
            return false;
        }

        if let Some(last_frame) = self.current_frame()
            && frame_no <= last_frame
        {
            log::error!(
                "Rejecting out-of-order snapshot for frame {frame_no} (newest is {last_frame})"
            );
            return false;
        }

        let compressed = match zstd::bulk::compress(snapshot, COMPRESSION_LEVEL) {
            Ok(compressed) => compressed.into_boxed_slice(),
            Err(err) => {
                log::error!("Failed to compress snapshot for frame {frame_no}: {err}");
                return false;
            }
        };

        if compressed.len() > self.capacity_bytes {
            log::error!(
                "Snapshot for frame {frame_no} ({} bytes compressed) exceeds the whole state buffer ({} bytes)",
                compressed.len(),
                self.capacity_bytes
            );
            return false;
        }

        self.total_bytes += compressed.len();
        self.records.push_back(SnapshotRecord {
            frame_no,
            bytes: compressed,
            uncompressed_len: snapshot.len(),
        });

        while self.total_bytes > self.capacity_bytes {
            let evicted = self.records.pop_front().expect("non-empty while over budget");
            self.total_bytes -= evicted.bytes.len();
        }

        true
    }

    #[must_use]
    pub fn current_frame(&self) -> Option<u64> {
        self.records.back().map(|record| record.frame_no)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    #[must_use]
    pub fn oldest_frame(&self) -> Option<u64> {
        self.records.front().map(|record| record.frame_no)
    }

    /// The record a seek bar position maps to: index `⌊p·(N−1)⌋`.
    #[must_use]
    pub fn record_at_percent(&self, percent: f64) -> Option<&SnapshotRecord> {
        if self.records.is_empty() {
            return None;
        }

        let percent = percent.clamp(0.0, 1.0);
        let index = (percent * (self.records.len() - 1) as f64).floor() as usize;
        self.records.get(index)
    }

    #[must_use]
    pub fn record_for_frame(&self, frame_no: u64) -> Option<&SnapshotRecord> {
        // Frame numbers are strictly increasing, so the deque is sorted
        let (front, back) = self.records.as_slices();
        let search = |slice: &[SnapshotRecord]| {
            slice.binary_search_by_key(&frame_no, SnapshotRecord::frame_no).ok()
        };
        search(front)
            .map(|index| &front[index])
            .or_else(|| search(back).map(|index| &back[index]))
    }

    /// Decompress the snapshot a seek position selects.
    #[must_use]
    pub fn snapshot_at_percent(&self, percent: f64) -> Option<(u64, Vec<u8>)> {
        self.record_at_percent(percent).and_then(decompress)
    }

    #[must_use]
    pub fn snapshot_for_frame(&self, frame_no: u64) -> Option<(u64, Vec<u8>)> {
        self.record_for_frame(frame_no).and_then(decompress)
    }

    /// Discard every record newer than `frame_no`, forgetting the timeline's
    /// "future" after a seek. Subsequent pushes must use larger frame numbers.
    pub fn trim_after(&mut self, frame_no: u64) {
        while let Some(record) = self.records.back() {
            if record.frame_no <= frame_no {
                break;
            }
            self.total_bytes -= record.bytes.len();
            self.records.pop_back();
        }
    }

    /// While paused, pushes are silently dropped. Used during seek drags so
    /// the buffer does not grow while the user scrubs.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Hard off switch for non-interactive modes.
    pub fn set_rolling_paused(&mut self, rolling_paused: bool) {
        self.rolling_paused = rolling_paused;
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotRecord> {
        self.records.iter()
    }
}

fn decompress(record: &SnapshotRecord) -> Option<(u64, Vec<u8>)> {
    match zstd::bulk::decompress(&record.bytes, record.uncompressed_len) {
        Ok(bytes) => Some((record.frame_no, bytes)),
        Err(err) => {
            log::error!("Failed to decompress snapshot for frame {}: {err}", record.frame_no);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_ring(frames: u64) -> StateRing {
        let mut ring = StateRing::new(DEFAULT_CAPACITY_BYTES);
        for frame in 0..frames {
            assert!(ring.push(frame, &frame.to_le_bytes()));
        }
        ring
    }

    #[test]
    fn frames_strictly_increase() {
        let mut ring = filled_ring(10);
        assert!(!ring.push(9, b"dup"));
        assert!(!ring.push(5, b"old"));
        assert!(ring.push(10, b"next"));

        let frames: Vec<u64> = ring.iter().map(SnapshotRecord::frame_no).collect();
        assert!(frames.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn snapshots_round_trip() {
        let mut ring = StateRing::new(DEFAULT_CAPACITY_BYTES);
        let payload = vec![0xA5_u8; 4096];
        assert!(ring.push(7, &payload));

        let (frame, bytes) = ring.snapshot_for_frame(7).unwrap();
        assert_eq!(frame, 7);
        assert_eq!(bytes, payload);
    }

    #[test]
    fn eviction_keeps_total_within_capacity() {
        // Incompressible payloads so each record has a predictable size
        let payloads: Vec<Vec<u8>> =
            (0..20_u8).map(|seed| (0..512).map(|i| seed ^ (i as u8).wrapping_mul(37)).collect()).collect();

        let mut ring = StateRing::new(2048);
        for (frame, payload) in payloads.iter().enumerate() {
            ring.push(frame as u64, payload);
            assert!(ring.total_bytes() <= ring.capacity_bytes());
        }

        assert!(ring.len() < 20);
        // Evictions are strict FIFO: the survivors are the newest frames
        assert_eq!(ring.current_frame(), Some(19));
        let frames: Vec<u64> = ring.iter().map(SnapshotRecord::frame_no).collect();
        assert!(frames.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn oversized_snapshot_is_refused() {
        let incompressible: Vec<u8> = (0..4096_u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        let mut ring = StateRing::new(64);
        assert!(!ring.push(0, &incompressible));
        assert!(ring.is_empty());
        assert_eq!(ring.total_bytes(), 0);
    }

    #[test]
    fn percent_indexing_boundaries() {
        let empty = StateRing::new(1024);
        assert!(empty.record_at_percent(0.0).is_none());
        assert!(empty.record_at_percent(1.0).is_none());

        let single = filled_ring(1);
        assert_eq!(single.record_at_percent(0.0).unwrap().frame_no(), 0);
        assert_eq!(single.record_at_percent(1.0).unwrap().frame_no(), 0);

        let ring = filled_ring(601);
        assert_eq!(ring.record_at_percent(0.0).unwrap().frame_no(), 0);
        assert_eq!(ring.record_at_percent(0.5).unwrap().frame_no(), 300);
        assert_eq!(ring.record_at_percent(1.0).unwrap().frame_no(), 600);
        // Out-of-range positions clamp
        assert_eq!(ring.record_at_percent(-0.5).unwrap().frame_no(), 0);
        assert_eq!(ring.record_at_percent(1.5).unwrap().frame_no(), 600);
    }

    #[test]
    fn trim_after_discards_the_future() {
        let mut ring = filled_ring(800);
        ring.trim_after(200);

        assert_eq!(ring.current_frame(), Some(200));
        assert_eq!(ring.len(), 201);

        // The next push must be a newer frame
        assert!(!ring.push(200, b"stale"));
        assert!(ring.push(201, b"fresh"));
    }

    #[test]
    fn trim_then_rebuild_preserves_old_snapshots() {
        let mut ring = StateRing::new(DEFAULT_CAPACITY_BYTES);
        for frame in 0..100_u64 {
            ring.push(frame, format!("state-{frame}").as_bytes());
        }

        let (_, original) = ring.snapshot_for_frame(40).unwrap();

        ring.trim_after(50);
        for frame in 51..120_u64 {
            ring.push(frame, format!("branch-{frame}").as_bytes());
        }

        let (_, replayed) = ring.snapshot_for_frame(40).unwrap();
        assert_eq!(original, replayed);
    }

    #[test]
    fn paused_ring_drops_pushes() {
        let mut ring = filled_ring(5);
        ring.set_paused(true);
        assert!(!ring.push(5, b"dropped"));
        assert_eq!(ring.current_frame(), Some(4));

        ring.set_paused(false);
        assert!(ring.push(5, b"kept"));

        ring.set_rolling_paused(true);
        assert!(!ring.push(6, b"dropped"));
        ring.set_rolling_paused(false);
        assert!(ring.push(6, b"kept"));
    }

    #[test]
    fn record_for_frame_uses_exact_match() {
        let ring = filled_ring(50);
        assert_eq!(ring.record_for_frame(25).unwrap().frame_no(), 25);
        assert!(ring.record_for_frame(50).is_none());
    }
}

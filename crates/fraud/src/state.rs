//! In-memory velocity state with a 24-hour sliding window
//!
//! Per-user circular buffer with hour-granularity buckets. Recording and
//! snapshotting both rotate the buffer first, so expired buckets never
//! leak into a signal.

use chrono::{DateTime, Utc};
use glowcast_core::UserId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Number of buckets (1 per hour for a 24-hour window)
const BUCKET_COUNT: usize = 24;

/// Per-entry snapshot of a user's trailing-24h activity.
///
/// Scoring input only - computed once per draft and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FraudSignal {
    pub tx_count_24h: u32,
    pub unique_ips_24h: u32,
    pub unique_devices_24h: u32,
    /// Mean fraud score of the window's recorded entries (0 when empty)
    pub average_score: f32,
}

impl FraudSignal {
    pub fn empty() -> Self {
        Self {
            tx_count_24h: 0,
            unique_ips_24h: 0,
            unique_devices_24h: 0,
            average_score: 0.0,
        }
    }
}

/// Single time bucket (1 hour of data)
#[derive(Debug, Default, Clone)]
struct Bucket {
    tx_count: u32,
    ips: HashSet<String>,
    devices: HashSet<String>,
    score_sum: u64,
    score_count: u32,
}

/// Sliding window for a single user
#[derive(Debug)]
struct TransactionWindow {
    buckets: [Bucket; BUCKET_COUNT],
    last_update: DateTime<Utc>,
}

impl TransactionWindow {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            buckets: std::array::from_fn(|_| Bucket::default()),
            last_update: now,
        }
    }

    fn bucket_index(timestamp: DateTime<Utc>) -> usize {
        let hours = timestamp.timestamp() / 3600;
        (hours as usize) % BUCKET_COUNT
    }

    /// Rotate buckets to the current time, clearing expired ones
    fn rotate_to_now(&mut self, now: DateTime<Utc>) {
        let last_idx = Self::bucket_index(self.last_update);
        let elapsed_hours = (now - self.last_update).num_hours();

        if elapsed_hours >= BUCKET_COUNT as i64 {
            for bucket in &mut self.buckets {
                *bucket = Bucket::default();
            }
        } else if elapsed_hours > 0 {
            let mut idx = (last_idx + 1) % BUCKET_COUNT;
            for _ in 0..elapsed_hours {
                self.buckets[idx] = Bucket::default();
                idx = (idx + 1) % BUCKET_COUNT;
            }
        }

        self.last_update = now;
    }

    fn record(
        &mut self,
        ip: Option<&str>,
        device: Option<&str>,
        score: u8,
        now: DateTime<Utc>,
    ) {
        self.rotate_to_now(now);
        let bucket = &mut self.buckets[Self::bucket_index(now)];
        bucket.tx_count += 1;
        if let Some(ip) = ip {
            bucket.ips.insert(ip.to_string());
        }
        if let Some(device) = device {
            bucket.devices.insert(device.to_string());
        }
        bucket.score_sum += u64::from(score);
        bucket.score_count += 1;
    }

    fn snapshot(&mut self, now: DateTime<Utc>) -> FraudSignal {
        self.rotate_to_now(now);

        let mut tx_count = 0u32;
        let mut ips: HashSet<&str> = HashSet::new();
        let mut devices: HashSet<&str> = HashSet::new();
        let mut score_sum = 0u64;
        let mut score_count = 0u32;

        for bucket in &self.buckets {
            tx_count += bucket.tx_count;
            ips.extend(bucket.ips.iter().map(String::as_str));
            devices.extend(bucket.devices.iter().map(String::as_str));
            score_sum += bucket.score_sum;
            score_count += bucket.score_count;
        }

        FraudSignal {
            tx_count_24h: tx_count,
            unique_ips_24h: ips.len() as u32,
            unique_devices_24h: devices.len() as u32,
            average_score: if score_count == 0 {
                0.0
            } else {
                score_sum as f32 / score_count as f32
            },
        }
    }
}

/// All users' sliding windows
#[derive(Debug, Default)]
pub struct VelocityState {
    windows: HashMap<UserId, TransactionWindow>,
}

impl VelocityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one committed entry's signals
    pub fn record_at(
        &mut self,
        user_id: &UserId,
        ip: Option<&str>,
        device: Option<&str>,
        score: u8,
        now: DateTime<Utc>,
    ) {
        self.windows
            .entry(user_id.clone())
            .or_insert_with(|| TransactionWindow::new(now))
            .record(ip, device, score, now);
    }

    /// Snapshot a user's trailing-24h signal
    pub fn snapshot_at(&mut self, user_id: &UserId, now: DateTime<Utc>) -> FraudSignal {
        match self.windows.get_mut(user_id) {
            Some(window) => window.snapshot(now),
            None => FraudSignal::empty(),
        }
    }
}

//! Advisory backup scheduling from observed usage.
//!
//! [`schedule`] is a pure function. Acting on its output (registering a
//! background job, waiting for Wi-Fi) is up to the embedding application.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

const HOUR: Duration = Duration::from_secs(60 * 60);
const MIB: u64 = 1024 * 1024;
/// Above this, a backup waits for Wi-Fi and is taken less often without it.
const LARGE_PAYLOAD: u64 = 50 * MIB;
/// Share of the raw data size expected to end up in a backup file, as a
/// fraction.
const PAYLOAD_RATIO: (u128, u128) = (3, 5);
const THROUGHPUT_BYTES_PER_SEC: u64 = 5 * MIB;
const BASE_DURATION: Duration = Duration::from_secs(2);
const MIN_BACKGROUND_BATTERY: u8 = 20;

/// How heavily the library is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageFrequency {
    Heavy,
    Regular,
    Occasional,
    Rare,
}

impl UsageFrequency {
    fn base_interval(self) -> Duration {
        match self {
            Self::Heavy => 6 * HOUR,
            Self::Regular => 24 * HOUR,
            Self::Occasional => 72 * HOUR,
            Self::Rare => 168 * HOUR,
        }
    }

    fn priority(self) -> BackupPriority {
        match self {
            Self::Heavy => BackupPriority::High,
            Self::Regular => BackupPriority::Normal,
            Self::Occasional | Self::Rare => BackupPriority::Low,
        }
    }
}

/// How costly it would be to lose the changes made since the last backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeImportance {
    Low,
    Medium,
    High,
    Critical,
}

impl ChangeImportance {
    fn interval_factor(self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 0.75,
            Self::High => 0.5,
            Self::Critical => 0.25,
        }
    }

    fn priority(self) -> BackupPriority {
        match self {
            Self::Low => BackupPriority::Low,
            Self::Medium => BackupPriority::Normal,
            Self::High => BackupPriority::High,
            Self::Critical => BackupPriority::Critical,
        }
    }
}

/// Ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupPriority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePattern {
    pub frequency: UsageFrequency,
    pub change_importance: ChangeImportance,
    /// Size of the data to back up, in bytes.
    pub data_size: u64,
    pub wifi_available: bool,
    /// Battery charge in percent.
    pub battery_level: u8,
    pub is_charging: bool,
    /// When the last backup was taken; the schedule counts from here.
    #[serde(default, with = "time::serde::timestamp::option")]
    pub last_backup_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledBackup {
    #[serde(with = "time::serde::timestamp")]
    pub scheduled_time: OffsetDateTime,
    pub priority: BackupPriority,
    pub estimated_duration: Duration,
    /// Expected size of the backup file, in bytes.
    pub estimated_size: u64,
    pub requires_wifi: bool,
    pub can_run_in_background: bool,
}

fn interval(pattern: &UsagePattern) -> Duration {
    let mut interval = pattern.frequency.base_interval().mul_f64(pattern.change_importance.interval_factor());
    if !pattern.wifi_available && pattern.data_size > LARGE_PAYLOAD {
        interval *= 2;
    }
    interval
}

fn estimated_duration(size: u64) -> Duration {
    BASE_DURATION + Duration::from_secs_f64(size as f64 / THROUGHPUT_BYTES_PER_SEC as f64)
}

/// Decide when the next backup should run.
///
/// The time is counted from `last_backup_at` (or `now` if there was none) and
/// is never earlier than `now`: an overdue backup is due immediately.
///
/// ```
/// use strongbox_engine::scheduler::{BackupPriority, ChangeImportance, UsageFrequency, UsagePattern, schedule};
/// use time::OffsetDateTime;
///
/// let now = OffsetDateTime::UNIX_EPOCH;
/// let pattern = UsagePattern {
///     frequency: UsageFrequency::Regular,
///     change_importance: ChangeImportance::High,
///     data_size: 1024,
///     wifi_available: true,
///     battery_level: 80,
///     is_charging: false,
///     last_backup_at: None,
/// };
/// let next = schedule(&pattern, now);
/// assert_eq!(next.scheduled_time, now + time::Duration::hours(12));
/// assert_eq!(next.priority, BackupPriority::High);
/// ```
pub fn schedule(pattern: &UsagePattern, now: OffsetDateTime) -> ScheduledBackup {
    let from = pattern.last_backup_at.unwrap_or(now);
    // A last backup at the far end of the calendar cannot be added to.
    let scheduled_time = time::Duration::try_from(interval(pattern))
        .ok()
        .and_then(|interval| from.checked_add(interval))
        .map_or(now, |due| due.max(now));
    let (numerator, denominator) = PAYLOAD_RATIO;
    let estimated_size = u64::try_from(u128::from(pattern.data_size) * numerator / denominator).unwrap_or(u64::MAX);
    let schedule = ScheduledBackup {
        scheduled_time,
        priority: pattern.frequency.priority().max(pattern.change_importance.priority()),
        estimated_duration: estimated_duration(estimated_size),
        estimated_size,
        requires_wifi: estimated_size > LARGE_PAYLOAD,
        can_run_in_background: pattern.battery_level >= MIN_BACKGROUND_BATTERY || pattern.is_charging,
    };
    tracing::debug!(?pattern, ?schedule, "scheduled backup");
    schedule
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Retention priority of a log
///
/// Only `High` and `Critical` logs honour `min_retention_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Whether the minimum retention window applies to this priority
    pub fn protects_recent(&self) -> bool {
        matches!(self, Priority::High | Priority::Critical)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Configuration for a log and its consumer group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Log name
    pub name: String,

    /// Consumer group name
    /// Default: `<name>_group`
    #[serde(default)]
    pub group: String,

    /// Ceiling on outstanding (pending) entries, and the length kept by a
    /// length-based trim
    /// Default: 1000
    #[serde(default = "default_max_length")]
    pub max_length: u64,

    /// Batch size hint for readers
    /// Default: 10
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// How often the log is trimmed
    /// Default: 5 minutes
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: Duration,

    #[serde(default)]
    pub priority: Priority,

    /// Entries older than this may be trimmed; zero disables age trimming
    /// Default: 1 hour
    #[serde(default = "default_max_age")]
    pub max_age: Duration,

    /// Entries younger than this are never trimmed on High/Critical logs
    /// Default: 10 minutes
    #[serde(default = "default_min_retention_time")]
    pub min_retention_time: Duration,

    /// Floor on the number of entries kept by a length-based trim
    /// Default: 100
    #[serde(default = "default_min_retention_count")]
    pub min_retention_count: u64,
}

fn default_max_length() -> u64 {
    1000
}

fn default_batch_size() -> u64 {
    10
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_max_age() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_min_retention_time() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_min_retention_count() -> u64 {
    100
}

impl StreamConfig {
    /// Default configuration for the named log
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            group: format!("{}_group", name),
            name,
            max_length: default_max_length(),
            batch_size: default_batch_size(),
            cleanup_interval: default_cleanup_interval(),
            priority: Priority::default(),
            max_age: default_max_age(),
            min_retention_time: default_min_retention_time(),
            min_retention_count: default_min_retention_count(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_max_length(mut self, max: u64) -> Self {
        self.max_length = max;
        self
    }

    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = age;
        self
    }

    pub fn with_min_retention_time(mut self, time: Duration) -> Self {
        self.min_retention_time = time;
        self
    }

    pub fn with_min_retention_count(mut self, count: u64) -> Self {
        self.min_retention_count = count;
        self
    }

    /// Fill in derived fields left empty by deserialization
    pub fn normalized(mut self) -> Self {
        if self.group.is_empty() {
            self.group = format!("{}_group", self.name);
        }
        self
    }
}

/// How long a cached backup-length observation stays trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCheckConfig {
    /// Trust window when the backup log was last seen empty
    /// Default: 50ms
    #[serde(default = "default_fast_timeout")]
    pub fast_timeout: Duration,

    /// Trust window when the backup log was last seen non-empty
    /// Default: 200ms
    #[serde(default = "default_slow_timeout")]
    pub slow_timeout: Duration,
}

fn default_fast_timeout() -> Duration {
    Duration::from_millis(50)
}

fn default_slow_timeout() -> Duration {
    Duration::from_millis(200)
}

impl Default for BackupCheckConfig {
    fn default() -> Self {
        Self {
            fast_timeout: default_fast_timeout(),
            slow_timeout: default_slow_timeout(),
        }
    }
}

/// Configuration for a producer with a secondary (backup) log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStreamConfig {
    #[serde(flatten)]
    pub stream: StreamConfig,

    /// Secondary log name
    /// Default: `<name>_backup`
    #[serde(default)]
    pub backup_log: String,

    /// Maximum entries moved back to the primary per transfer cycle
    /// Default: 10
    #[serde(default = "default_transfer_batch_size")]
    pub transfer_batch_size: u64,

    /// TTL of the lock held by a transfer cycle
    /// Default: 10s
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: Duration,

    #[serde(default)]
    pub backup_check: BackupCheckConfig,

    /// Delay before the next transfer cycle after one that moved entries
    /// Default: 500ms
    #[serde(default = "default_transfer_interval_active")]
    pub transfer_interval_active: Duration,

    /// Delay before the next transfer cycle after an idle one
    /// Default: 2s
    #[serde(default = "default_transfer_interval_idle")]
    pub transfer_interval_idle: Duration,
}

fn default_transfer_batch_size() -> u64 {
    10
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_transfer_interval_active() -> Duration {
    Duration::from_millis(500)
}

fn default_transfer_interval_idle() -> Duration {
    Duration::from_secs(2)
}

impl BackupStreamConfig {
    /// Default configuration for the named primary log
    pub fn new(name: impl Into<String>) -> Self {
        let stream = StreamConfig::new(name);
        Self {
            backup_log: format!("{}_backup", stream.name),
            stream,
            transfer_batch_size: default_transfer_batch_size(),
            lock_timeout: default_lock_timeout(),
            backup_check: BackupCheckConfig::default(),
            transfer_interval_active: default_transfer_interval_active(),
            transfer_interval_idle: default_transfer_interval_idle(),
        }
    }

    /// Wrap an existing stream configuration with backup defaults
    pub fn from_stream(stream: StreamConfig) -> Self {
        let mut config = Self::new(stream.name.clone());
        config.stream = stream;
        config
    }

    pub fn with_backup_log(mut self, log: impl Into<String>) -> Self {
        self.backup_log = log.into();
        self
    }

    pub fn with_transfer_batch_size(mut self, size: u64) -> Self {
        self.transfer_batch_size = size;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_backup_check(mut self, check: BackupCheckConfig) -> Self {
        self.backup_check = check;
        self
    }

    pub fn with_transfer_intervals(mut self, active: Duration, idle: Duration) -> Self {
        self.transfer_interval_active = active;
        self.transfer_interval_idle = idle;
        self
    }

    pub fn name(&self) -> &str {
        &self.stream.name
    }

    pub fn normalized(mut self) -> Self {
        self.stream = self.stream.normalized();
        if self.backup_log.is_empty() {
            self.backup_log = format!("{}_backup", self.stream.name);
        }
        self
    }
}

/// Configuration for a consumer-group reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Log to read from
    pub log: String,

    /// Consumer group
    /// Default: `<log>_group`
    #[serde(default)]
    pub group: String,

    /// Consumer identity within the group
    /// Default: `<log>_consumer`
    #[serde(default)]
    pub consumer: String,

    /// Length kept when the consumer trims its log
    /// Default: 10000
    #[serde(default = "default_max_messages")]
    pub max_messages: u64,

    /// How often the consumer trims its log
    /// Default: 30 minutes
    #[serde(default = "default_consumer_cleanup_interval")]
    pub cleanup_interval: Duration,

    /// Entries requested per group read
    /// Default: 10
    #[serde(default = "default_read_count")]
    pub read_count: u64,

    /// Longest a group read waits for new entries
    /// Default: 1s
    #[serde(default = "default_block_duration")]
    pub block_duration: Duration,
}

fn default_max_messages() -> u64 {
    10_000
}

fn default_consumer_cleanup_interval() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_read_count() -> u64 {
    10
}

fn default_block_duration() -> Duration {
    Duration::from_secs(1)
}

impl ConsumerConfig {
    /// Default configuration for reading the named log
    pub fn new(log: impl Into<String>) -> Self {
        let log = log.into();
        Self {
            group: format!("{}_group", log),
            consumer: format!("{}_consumer", log),
            log,
            max_messages: default_max_messages(),
            cleanup_interval: default_consumer_cleanup_interval(),
            read_count: default_read_count(),
            block_duration: default_block_duration(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    pub fn with_max_messages(mut self, max: u64) -> Self {
        self.max_messages = max;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_read_count(mut self, count: u64) -> Self {
        self.read_count = count;
        self
    }

    pub fn with_block_duration(mut self, duration: Duration) -> Self {
        self.block_duration = duration;
        self
    }

    pub fn normalized(mut self) -> Self {
        if self.group.is_empty() {
            self.group = format!("{}_group", self.log);
        }
        if self.consumer.is_empty() {
            self.consumer = format!("{}_consumer", self.log);
        }
        self
    }

    /// Retention applied by the consumer's own cleanup loop
    ///
    /// Consumers keep a longer window than producers: two hours of age,
    /// thirty minutes of guaranteed retention, and at least 100 entries.
    pub fn cleanup_stream_config(&self) -> StreamConfig {
        StreamConfig {
            name: self.log.clone(),
            group: self.group.clone(),
            max_length: self.max_messages,
            batch_size: default_batch_size(),
            cleanup_interval: self.cleanup_interval,
            priority: Priority::Normal,
            max_age: Duration::from_secs(2 * 60 * 60),
            min_retention_time: Duration::from_secs(30 * 60),
            min_retention_count: 100,
        }
    }
}

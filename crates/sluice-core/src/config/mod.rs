pub mod stream;

pub use stream::{BackupCheckConfig, BackupStreamConfig, ConsumerConfig, Priority, StreamConfig};

pub mod matcher;
pub mod storage;
pub mod logging;

pub use matcher::MatcherConfig;
pub use storage::{StorageConfig, StorageBackendKind, FlushPolicy};
pub use logging::LoggingConfig;

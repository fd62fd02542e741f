pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod storage;
pub mod update;

pub use config::{Config, ConfigProvider};
pub use error::{BootError, Result};
pub use http::{HttpTransport, Transport};
pub use storage::CacheRoot;
pub use update::{bootstrap, BootReport, Orchestrator, UpdateOutcome};

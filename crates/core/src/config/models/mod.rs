pub mod api_observability;
pub mod app_config;
pub mod dispatcher_worker;
pub mod storage;
pub mod task_seed;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use dispatcher_worker::{DispatcherConfig, WorkerConfig, MAX_BACKOFF_LIMIT_SECONDS};
pub use storage::{StorageBackend, StorageConfig};
pub use task_seed::TaskSeed;

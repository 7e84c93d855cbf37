//! 任务存储实现
//!
//! 内存存储用于单进程部署和测试，SQLite存储用于需要持久化的部署。

pub mod database;
pub mod in_memory_repository;
pub mod repository_factory;

pub use database::SqliteTaskRepository;
pub use in_memory_repository::InMemoryTaskRepository;
pub use repository_factory::TaskRepositoryFactory;

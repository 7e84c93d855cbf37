//! # Cronmesh Testing Utils
//!
//! 各crate共享的测试工具：内存任务存储、可编排失败的任务发送器、
//! 记录调用的执行器，以及测试数据构建器。
//!
//! ```toml
//! [dev-dependencies]
//! cronmesh-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;

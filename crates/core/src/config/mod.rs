//! 配置管理
//!
//! 加载顺序：
//! 1. 各配置结构体的默认值
//! 2. TOML 配置文件
//! 3. 环境变量覆盖（前缀 `CRONMESH__`，层级分隔符 `__`）
//!
//! ```rust,no_run
//! use cronmesh_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/cronmesh.toml")).expect("加载配置失败");
//! println!("调度策略: {}", config.dispatcher.dispatch_strategy);
//! ```

pub mod models;

pub use models::*;

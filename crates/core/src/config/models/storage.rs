use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

/// 任务存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: "sqlite://cronmesh.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend == StorageBackend::Sqlite {
            if self.database_url.trim().is_empty() {
                return Err(anyhow::anyhow!("数据库URL不能为空"));
            }
            if !self.database_url.starts_with("sqlite:") {
                return Err(anyhow::anyhow!(
                    "不支持的数据库URL: {}",
                    self.database_url
                ));
            }
            if self.max_connections == 0 {
                return Err(anyhow::anyhow!("最大连接数必须大于0"));
            }
        }
        Ok(())
    }
}

//! 数据库行与任务字段之间的转换
//!
//! SQLite没有数组和JSON列类型，列表、重试策略和参数都以JSON文本存储。

use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use cronmesh_core::{DagStatus, SchedulerError, SchedulerResult};

pub struct MappingHelpers;

impl MappingHelpers {
    /// 解析JSON文本列；列为NULL时返回默认值
    pub fn parse_json<T>(row: &SqliteRow, field_name: &str) -> SchedulerResult<T>
    where
        T: DeserializeOwned + Default,
    {
        match row.try_get::<Option<String>, _>(field_name)? {
            Some(json_str) if !json_str.is_empty() => Ok(serde_json::from_str(&json_str)?),
            _ => Ok(T::default()),
        }
    }

    pub fn to_json<T: Serialize>(value: &T) -> SchedulerResult<String> {
        Ok(serde_json::to_string(value)?)
    }

    pub fn parse_uuid(row: &SqliteRow, field_name: &str) -> SchedulerResult<Uuid> {
        let text: String = row.try_get(field_name)?;
        Uuid::parse_str(&text)
            .map_err(|e| SchedulerError::Internal(format!("解析{field_name}失败: {e}")))
    }

    pub fn parse_optional_uuid(row: &SqliteRow, field_name: &str) -> SchedulerResult<Option<Uuid>> {
        match row.try_get::<Option<String>, _>(field_name)? {
            Some(text) => Uuid::parse_str(&text)
                .map(Some)
                .map_err(|e| SchedulerError::Internal(format!("解析{field_name}失败: {e}"))),
            None => Ok(None),
        }
    }

    pub fn parse_dag_status(row: &SqliteRow, field_name: &str) -> SchedulerResult<DagStatus> {
        let text: String = row.try_get(field_name)?;
        DagStatus::parse(&text)
            .ok_or_else(|| SchedulerError::Internal(format!("未知的DAG状态: {text}")))
    }

    /// 计数列以 INTEGER 存储
    pub fn parse_u32(row: &SqliteRow, field_name: &str) -> SchedulerResult<u32> {
        let value: i64 = row.try_get(field_name)?;
        u32::try_from(value)
            .map_err(|_| SchedulerError::Internal(format!("{field_name} 超出范围: {value}")))
    }
}

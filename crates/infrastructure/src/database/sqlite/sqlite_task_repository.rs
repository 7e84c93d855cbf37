use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use cronmesh_core::{
    models::ScheduledTask, traits::TaskRepository, SchedulerError, SchedulerResult,
};

use crate::database::mapping::MappingHelpers;

const SELECT_COLUMNS: &str = r#"
    id, name, schedule, next_run_time, enabled, task_type, parameters, retry_policy,
    timeout_seconds, created_at, updated_at, current_retry_count, next_retry_time,
    predecessor_ids, successor_ids, dag_status, completed_dependencies_count,
    total_dependencies_count, workflow_id, priority, allow_parallel_execution
"#;

/// 基于SQLite的任务存储
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    /// 使用已有连接池，调用方负责建表
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 连接数据库并自动建表
    pub async fn connect(database_url: &str, max_connections: u32) -> SchedulerResult<Self> {
        debug!("连接SQLite任务存储: {}", database_url);

        let in_memory = database_url.contains(":memory:");
        let mut connect_options =
            SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // 内存数据库每个连接各自独立，只能使用单连接
        let max_connections = if in_memory { 1 } else { max_connections.max(1) };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .connect_with(connect_options)
            .await?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 创建任务表和索引
    pub async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
        debug!("执行SQLite数据库迁移");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_tasks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                schedule TEXT NOT NULL,
                next_run_time TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                task_type TEXT NOT NULL,
                parameters TEXT NOT NULL DEFAULT 'null',
                retry_policy TEXT NOT NULL,
                timeout_seconds INTEGER NOT NULL DEFAULT 300,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                current_retry_count INTEGER NOT NULL DEFAULT 0,
                next_retry_time TEXT,
                predecessor_ids TEXT NOT NULL DEFAULT '[]',
                successor_ids TEXT NOT NULL DEFAULT '[]',
                dag_status TEXT NOT NULL DEFAULT 'WAITING',
                completed_dependencies_count INTEGER NOT NULL DEFAULT 0,
                total_dependencies_count INTEGER NOT NULL DEFAULT 0,
                workflow_id TEXT,
                priority INTEGER NOT NULL DEFAULT 0,
                allow_parallel_execution INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(pool)
        .await?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_scheduled_tasks_next_run ON scheduled_tasks(next_run_time)",
            "CREATE INDEX IF NOT EXISTS idx_scheduled_tasks_workflow ON scheduled_tasks(workflow_id)",
        ];
        for index_sql in indexes {
            sqlx::query(index_sql).execute(pool).await?;
        }

        Ok(())
    }

    fn row_to_task(row: &SqliteRow) -> SchedulerResult<ScheduledTask> {
        let timeout_seconds: i64 = row.try_get("timeout_seconds")?;

        Ok(ScheduledTask {
            id: MappingHelpers::parse_uuid(row, "id")?,
            name: row.try_get("name")?,
            schedule: row.try_get("schedule")?,
            next_run_time: row.try_get("next_run_time")?,
            enabled: row.try_get("enabled")?,
            task_type: row.try_get("task_type")?,
            parameters: MappingHelpers::parse_json(row, "parameters")?,
            retry_policy: MappingHelpers::parse_json(row, "retry_policy")?,
            timeout_seconds: timeout_seconds.max(0) as u64,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            current_retry_count: MappingHelpers::parse_u32(row, "current_retry_count")?,
            next_retry_time: row.try_get("next_retry_time")?,
            predecessor_ids: MappingHelpers::parse_json(row, "predecessor_ids")?,
            successor_ids: MappingHelpers::parse_json(row, "successor_ids")?,
            dag_status: MappingHelpers::parse_dag_status(row, "dag_status")?,
            completed_dependencies_count: MappingHelpers::parse_u32(
                row,
                "completed_dependencies_count",
            )?,
            total_dependencies_count: MappingHelpers::parse_u32(row, "total_dependencies_count")?,
            workflow_id: MappingHelpers::parse_optional_uuid(row, "workflow_id")?,
            priority: row.try_get("priority")?,
            allow_parallel_execution: row.try_get("allow_parallel_execution")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(task_id = %task.id, task_name = %task.name))]
    async fn add_task(&self, task: &ScheduledTask) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO scheduled_tasks (
                id, name, schedule, next_run_time, enabled, task_type, parameters, retry_policy,
                timeout_seconds, created_at, updated_at, current_retry_count, next_retry_time,
                predecessor_ids, successor_ids, dag_status, completed_dependencies_count,
                total_dependencies_count, workflow_id, priority, allow_parallel_execution
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.to_string())
        .bind(&task.name)
        .bind(&task.schedule)
        .bind(task.next_run_time)
        .bind(task.enabled)
        .bind(&task.task_type)
        .bind(MappingHelpers::to_json(&task.parameters)?)
        .bind(MappingHelpers::to_json(&task.retry_policy)?)
        .bind(task.timeout_seconds as i64)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.current_retry_count as i64)
        .bind(task.next_retry_time)
        .bind(MappingHelpers::to_json(&task.predecessor_ids)?)
        .bind(MappingHelpers::to_json(&task.successor_ids)?)
        .bind(task.dag_status.as_str())
        .bind(task.completed_dependencies_count as i64)
        .bind(task.total_dependencies_count as i64)
        .bind(task.workflow_id.map(|id| id.to_string()))
        .bind(task.priority)
        .bind(task.allow_parallel_execution)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("任务已保存");
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                SchedulerError::invalid_argument(format!("任务 {} 已存在", task.id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn update_task(&self, task: &ScheduledTask) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_tasks SET
                name = ?, schedule = ?, next_run_time = ?, enabled = ?, task_type = ?,
                parameters = ?, retry_policy = ?, timeout_seconds = ?, updated_at = ?,
                current_retry_count = ?, next_retry_time = ?, predecessor_ids = ?,
                successor_ids = ?, dag_status = ?, completed_dependencies_count = ?,
                total_dependencies_count = ?, workflow_id = ?, priority = ?,
                allow_parallel_execution = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.name)
        .bind(&task.schedule)
        .bind(task.next_run_time)
        .bind(task.enabled)
        .bind(&task.task_type)
        .bind(MappingHelpers::to_json(&task.parameters)?)
        .bind(MappingHelpers::to_json(&task.retry_policy)?)
        .bind(task.timeout_seconds as i64)
        .bind(task.updated_at)
        .bind(task.current_retry_count as i64)
        .bind(task.next_retry_time)
        .bind(MappingHelpers::to_json(&task.predecessor_ids)?)
        .bind(MappingHelpers::to_json(&task.successor_ids)?)
        .bind(task.dag_status.as_str())
        .bind(task.completed_dependencies_count as i64)
        .bind(task.total_dependencies_count as i64)
        .bind(task.workflow_id.map(|id| id.to_string()))
        .bind(task.priority)
        .bind(task.allow_parallel_execution)
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskNotFound { id: task.id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_task(&self, id: Uuid) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM scheduled_tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_task(&self, id: Uuid) -> SchedulerResult<Option<ScheduledTask>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM scheduled_tasks WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn get_all_tasks(&self) -> SchedulerResult<Vec<ScheduledTask>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM scheduled_tasks ORDER BY priority DESC, created_at"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_task).collect()
    }
}

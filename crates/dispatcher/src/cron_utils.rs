use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use cronmesh_core::{SchedulerError, SchedulerResult};

/// 星期名称，下标即传统cron中的数字（0 和 7 都表示周日）
const WEEKDAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

#[derive(Debug, Clone)]
enum ScheduleKind {
    /// `*/N` 秒级间隔
    Interval(Duration),
    /// 分钟粒度的日历调度
    Calendar(Box<Schedule>),
}

/// CRON表达式解析和调度工具
///
/// 支持两种形式：
/// - 6字段且首字段为 `*/N`：每 N 秒执行一次，下次时间为 `from + N 秒`
/// - 标准5字段，或首字段作为秒占位符被忽略的6字段表达式，按UTC计算
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    kind: ScheduleKind,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let fields: Vec<&str> = cron_expr.split_whitespace().collect();

        let kind = match fields.as_slice() {
            [seconds, _, _, _, _, _] if seconds.starts_with("*/") => {
                ScheduleKind::Interval(parse_interval(cron_expr, &seconds[2..])?)
            }
            [minute, hour, dom, month, dow] | [_, minute, hour, dom, month, dow] => {
                let normalized = format!(
                    "0 {minute} {hour} {dom} {month} {}",
                    normalize_weekday_field(dow)
                );
                debug!("标准化CRON表达式: {} -> {}", cron_expr, normalized);
                let schedule = Schedule::from_str(&normalized)
                    .map_err(|e| SchedulerError::cron_parse(cron_expr, e.to_string()))?;
                ScheduleKind::Calendar(Box::new(schedule))
            }
            _ => {
                return Err(SchedulerError::cron_parse(
                    cron_expr,
                    format!("字段数量为 {}，应为5或6个字段", fields.len()),
                ))
            }
        };

        Ok(Self {
            expression: cron_expr.to_string(),
            kind,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取严格晚于 `from` 的下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> SchedulerResult<DateTime<Utc>> {
        match &self.kind {
            ScheduleKind::Interval(interval) => from.checked_add_signed(*interval).ok_or_else(|| {
                SchedulerError::cron_parse(&self.expression, "秒级间隔超出可表示的时间范围")
            }),
            ScheduleKind::Calendar(schedule) => schedule.after(&from).next().ok_or_else(|| {
                SchedulerError::cron_parse(&self.expression, "表达式没有未来的执行时间")
            }),
        }
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        match &self.kind {
            ScheduleKind::Interval(interval) => (1..=count as i32)
                .map_while(|i| {
                    interval
                        .checked_mul(i)
                        .and_then(|offset| from.checked_add_signed(offset))
                })
                .collect(),
            ScheduleKind::Calendar(schedule) => schedule.after(&from).take(count).collect(),
        }
    }

    /// 验证CRON表达式是否有效（能解析并且存在未来的执行时间）
    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr)?.next_execution_time(Utc::now())?;
        Ok(())
    }
}

fn parse_interval(cron_expr: &str, raw: &str) -> SchedulerResult<Duration> {
    let seconds: i64 = raw.parse().map_err(|_| {
        SchedulerError::cron_parse(cron_expr, format!("秒级间隔 '{raw}' 不是整数"))
    })?;
    if seconds <= 0 {
        return Err(SchedulerError::cron_parse(
            cron_expr,
            format!("秒级间隔必须为正整数，实际为 {seconds}"),
        ));
    }
    Duration::try_seconds(seconds).ok_or_else(|| {
        SchedulerError::cron_parse(cron_expr, format!("秒级间隔 {seconds} 超出范围"))
    })
}

/// 把传统cron的数字星期（0-7，0和7为周日）转换为名称
///
/// 步长部分保持不变；超出范围的数字原样保留，由解析器报错。
fn normalize_weekday_field(field: &str) -> String {
    let (base, step) = match field.split_once('/') {
        Some((base, step)) => (base, Some(step)),
        None => (field, None),
    };

    let base = base
        .split(',')
        .map(|item| normalize_weekday_item(item, step.is_some()))
        .collect::<Vec<_>>()
        .join(",");

    match step {
        Some(step) => format!("{base}/{step}"),
        None => base,
    }
}

fn normalize_weekday_item(item: &str, stepped: bool) -> String {
    match item.split_once('-') {
        Some((start, end)) => match (weekday_index(start), weekday_index(end)) {
            (Some(0), Some(7)) => "SUN-SAT".to_string(),
            // 带步长时区间不能拆分，x-7 截断到周六
            (Some(s), Some(7)) if stepped => format!("{}-SAT", WEEKDAY_NAMES[s]),
            (Some(6), Some(7)) => "SAT,SUN".to_string(),
            // x-7 以周日结尾，拆成 x-SAT 加 SUN，避免出现倒序区间
            (Some(s), Some(7)) => format!("{}-SAT,SUN", WEEKDAY_NAMES[s]),
            (Some(s), Some(e)) => format!("{}-{}", WEEKDAY_NAMES[s], WEEKDAY_NAMES[e]),
            _ => item.to_string(),
        },
        None => match weekday_index(item) {
            Some(index) => WEEKDAY_NAMES[index].to_string(),
            None => item.to_string(),
        },
    }
}

fn weekday_index(token: &str) -> Option<usize> {
    token.parse::<usize>().ok().filter(|n| *n <= 7)
}

/// 无状态的CRON求值入口
pub struct CronEvaluator;

impl CronEvaluator {
    /// 计算下一次执行时间（UTC），结果严格晚于 `from`
    pub fn next_occurrence(expression: &str, from: DateTime<Utc>) -> SchedulerResult<DateTime<Utc>> {
        CronScheduler::new(expression)?.next_execution_time(from)
    }

    /// 不带时区的时间按UTC处理
    pub fn next_occurrence_naive(
        expression: &str,
        from: NaiveDateTime,
    ) -> SchedulerResult<DateTime<Utc>> {
        Self::next_occurrence(expression, Utc.from_utc_datetime(&from))
    }

    pub fn upcoming(
        expression: &str,
        from: DateTime<Utc>,
        count: usize,
    ) -> SchedulerResult<Vec<DateTime<Utc>>> {
        Ok(CronScheduler::new(expression)?.upcoming_times(from, count))
    }

    /// 仅做校验，不返回错误
    pub fn is_valid(expression: &str) -> bool {
        CronScheduler::validate_cron_expression(expression).is_ok()
    }
}

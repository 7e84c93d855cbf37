use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::dispatcher_client::CoordinatorLink;

/// 心跳间隔，与调度循环的轮询间隔无关
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Worker心跳发送器
///
/// 启动时先注册，之后按固定间隔发送心跳；失败只记录日志，下一个周期继续。
pub struct HeartbeatManager {
    link: Arc<dyn CoordinatorLink>,
    interval: Duration,
}

impl HeartbeatManager {
    pub fn new(link: Arc<dyn CoordinatorLink>) -> Self {
        Self {
            link,
            interval: HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 启动后台心跳任务，收到停止信号时退出
    pub fn start(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let link = Arc::clone(&self.link);
        let period = self.interval;

        tokio::spawn(async move {
            if let Err(e) = link.register().await {
                warn!("Worker注册失败，将依靠心跳重新注册: {}", e);
            }

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = link.send_heartbeat().await {
                            warn!("发送心跳失败: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("心跳任务退出");
                        break;
                    }
                }
            }
        })
    }
}

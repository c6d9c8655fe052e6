use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 进程级关闭信号
///
/// 服务端、Worker代理和维护任务共用同一个实例；关闭只会触发一次，
/// 关闭之后再订阅得到的接收器会立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    inner: Arc<Inner>,
}

struct Inner {
    sender: Mutex<Option<broadcast::Sender<()>>>,
    triggered: AtomicBool,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(4);
        Self {
            inner: Arc::new(Inner {
                sender: Mutex::new(Some(sender)),
                triggered: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        let guard = self.inner.sender.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                let _ = sender.send(());
                receiver
            }
        }
    }

    /// 触发关闭，返回本次调用是否真正发出了信号
    pub fn shutdown(&self) -> bool {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            debug!("关闭信号已发出过");
            return false;
        }

        let sender = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(sender) = sender {
            info!("发送关闭信号给 {} 个订阅者", sender.receiver_count());
            let _ = sender.send(());
        }
        true
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// 在限定时间内等待后台任务退出，超时返回false
    pub async fn drain<T>(&self, name: &str, handle: JoinHandle<T>, limit: Duration) -> bool {
        match tokio::time::timeout(limit, handle).await {
            Ok(Ok(_)) => {
                info!("{name} 已退出");
                true
            }
            Ok(Err(e)) => {
                error!("{name} 异常退出: {e}");
                true
            }
            Err(_) => {
                warn!("{name} 在 {:?} 内未退出", limit);
                false
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_subscribers_notified_once() {
        let manager = ShutdownManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.clone().subscribe();

        assert!(manager.shutdown());
        assert!(!manager.shutdown());
        assert!(manager.is_shutdown());

        tokio::time::timeout(Duration::from_secs(1), rx1.recv())
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_late_subscriber_fires_immediately() {
        let manager = ShutdownManager::new();
        manager.shutdown();

        let mut rx = manager.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_drain_reports_stuck_task() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe();
        let listening = tokio::spawn(async move {
            let _ = rx.recv().await;
        });
        let stuck = tokio::spawn(std::future::pending::<()>());

        manager.shutdown();
        assert!(manager.drain("listener", listening, Duration::from_secs(1)).await);
        assert!(!manager.drain("stuck", stuck, Duration::from_millis(50)).await);
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};

use jobhub_core::models::{JobKind, WorkerNode};
use tracing::debug;

/// Worker选择策略
///
/// 输入是 `list_active` 的结果（容量降序、名称升序），返回本次派发的目标。
pub trait WorkerSelectionStrategy: Send + Sync {
    fn select<'a>(&self, kind: JobKind, workers: &'a [WorkerNode]) -> Option<&'a WorkerNode>;

    fn name(&self) -> &str;
}

/// 选择列表中的第一个Worker，即容量最大者
#[derive(Debug, Default)]
pub struct FirstAvailableStrategy;

impl WorkerSelectionStrategy for FirstAvailableStrategy {
    fn select<'a>(&self, kind: JobKind, workers: &'a [WorkerNode]) -> Option<&'a WorkerNode> {
        let selected = workers.first();
        match selected {
            Some(worker) => debug!("{} 选择Worker: {} (容量: {})", kind, worker.id, worker.capacity),
            None => debug!("{} 没有可用的Worker节点", kind),
        }
        selected
    }

    fn name(&self) -> &str {
        "FirstAvailable"
    }
}

pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSelectionStrategy for RoundRobinStrategy {
    fn select<'a>(&self, kind: JobKind, workers: &'a [WorkerNode]) -> Option<&'a WorkerNode> {
        if workers.is_empty() {
            debug!("{} 没有可用的Worker节点", kind);
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % workers.len();
        let selected = &workers[index];

        debug!(
            "轮询策略选择Worker: {} (索引: {}/{})",
            selected.id,
            index,
            workers.len()
        );
        Some(selected)
    }

    fn name(&self) -> &str {
        "RoundRobin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn worker(id: &str, capacity: i32) -> WorkerNode {
        WorkerNode {
            id: id.to_string(),
            name: id.to_string(),
            base_url: format!("http://{id}:9000"),
            capacity,
            is_active: true,
            last_heartbeat: Utc::now(),
            last_error: None,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_available_takes_head() {
        let workers = vec![worker("big", 8), worker("small", 2)];
        let strategy = FirstAvailableStrategy;

        assert_eq!(
            strategy.select(JobKind::Warmup, &workers).map(|w| w.id.as_str()),
            Some("big")
        );
        assert!(strategy.select(JobKind::Warmup, &[]).is_none());
    }

    #[test]
    fn test_round_robin_cycles() {
        let workers = vec![worker("a", 4), worker("b", 4), worker("c", 4)];
        let strategy = RoundRobinStrategy::new();

        let picks: Vec<String> = (0..4)
            .filter_map(|_| strategy.select(JobKind::Follow, &workers))
            .map(|w| w.id.clone())
            .collect();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);
    }
}

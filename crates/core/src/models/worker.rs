use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Worker节点信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerNode {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub capacity: i32,
    pub is_active: bool,
    pub last_heartbeat: DateTime<Utc>,
    pub last_error: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Worker注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub base_url: String,
    #[serde(default)]
    pub name: Option<String>,
    pub capacity: i32,
}

/// 注册成功后返回的Worker ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRegistered {
    pub worker_id: String,
}

/// Worker上报的最近一次错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerErrorReport {
    pub message: String,
}

/// 心跳与错误上报的应答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAck {
    pub worker_id: String,
    pub ok: bool,
}

/// 素材认领查询：由调用方给出候选ID，Worker返回自己负责的部分
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub worker_id: String,
    pub bucket: u64,
    pub owned: Vec<String>,
    pub skipped: usize,
}

impl WorkerNode {
    /// 检查心跳是否超时
    pub fn is_heartbeat_expired(&self, staleness: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_heartbeat > staleness
    }

    /// 是否可以参与调度：标记为活跃且心跳未过期
    pub fn is_dispatchable(&self, staleness: Duration, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_heartbeat_expired(staleness, now)
    }
}

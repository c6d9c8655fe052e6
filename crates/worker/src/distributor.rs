//! 素材分配
//!
//! 多个Worker共享同一批素材（头像、简介、视频等）时，用稳定哈希分桶决定
//! 每个素材归谁处理：`bucket(item) == bucket(worker)` 即归属该Worker。
//!
//! 已知边界：
//! - 两个Worker落在同一个桶时，二者都认为自己拥有该桶的素材
//! - 没有Worker的桶中的素材无人处理
//! - Worker增减时不做再平衡，归属只由键和桶数决定

use jobhub_core::{config::DistributionConfig, SchedulerError, SchedulerResult};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct WorkDistributor {
    bucket_count: u64,
}

impl WorkDistributor {
    pub fn new(bucket_count: u64) -> SchedulerResult<Self> {
        if bucket_count == 0 {
            return Err(SchedulerError::Validation("分桶数量必须大于0".to_string()));
        }
        Ok(Self { bucket_count })
    }

    pub fn from_config(config: &DistributionConfig) -> SchedulerResult<Self> {
        Self::new(config.bucket_count)
    }

    pub fn bucket_count(&self) -> u64 {
        self.bucket_count
    }

    /// SHA-256 摘要的前8字节（大端）
    pub fn stable_hash(key: &str) -> u64 {
        let digest = Sha256::digest(key.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }

    pub fn bucket_of(&self, key: &str) -> u64 {
        Self::stable_hash(key) % self.bucket_count
    }

    pub fn owns(&self, item_id: &str, worker_id: &str) -> bool {
        self.bucket_of(item_id) == self.bucket_of(worker_id)
    }

    /// 过滤出归属该Worker的素材，保持原有顺序
    pub fn owned_items<'a, T: AsRef<str>>(&self, items: &'a [T], worker_id: &str) -> Vec<&'a T> {
        let bucket = self.bucket_of(worker_id);
        items
            .iter()
            .filter(|item| self.bucket_of(item.as_ref()) == bucket)
            .collect()
    }
}

impl Default for WorkDistributor {
    fn default() -> Self {
        Self { bucket_count: 10 }
    }
}

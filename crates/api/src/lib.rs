//! # Jobhub API
//!
//! 作业编排与分布式锁服务的HTTP控制面，基于Axum构建。
//!
//! ## API 端点
//!
//! ### 作业管理
//! - `POST /api/{kind}/start?task_id=<id>` - 启动作业，请求体为可选的 `StartOptions`
//! - `POST /api/jobs/{id}/stop` - 请求停止作业
//! - `DELETE /api/jobs/{id}` - 删除已结束的作业
//! - `GET /api/jobs` - 作业列表
//! - `GET /api/jobs/{id}/status` - 作业状态
//! - `GET /api/metrics` - 汇总指标
//!
//! ### Worker管理
//! - `POST /api/workers/register` - 注册Worker
//! - `POST /api/workers/{id}/heartbeat` - Worker心跳
//! - `POST /api/workers/{id}/error` - 上报最近错误
//! - `GET /api/workers?min_capacity=` - 可调度的Worker
//!
//! ### 任务锁
//! - `GET /api/locks?kind=&worker_id=` - 任务锁报告
//!
//! ## 错误响应
//!
//! 参数错误返回400，资源不存在返回404，任务锁冲突返回409，其余返回500。
//! 响应体统一为：
//!
//! ```json
//! { "detail": "任务锁冲突: bulk_login/42 已被 node-a 持有" }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use axum::Router;
use jobhub_core::config::ApiConfig;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, timeout_layer, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, api_config: &ApiConfig) -> Router {
    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging))
            .layer(timeout_layer(api_config.request_timeout_seconds)),
    );

    if api_config.cors_enabled {
        router.layer(cors_layer(&api_config.cors_origins))
    } else {
        router
    }
}

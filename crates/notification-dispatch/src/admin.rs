//! 监听器运维 API
//!
//! 对监听管理器的薄包装，供运维人员在不重新部署的情况下
//! 启停单个 topic 的消费。配置类空操作（已在监听、未在监听、空 topic）
//! 以布尔结果表达，统一返回 200。

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Serialize;

use crate::listener::{ListenerInfo, ListenerManager};

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ListenerManager>,
}

/// 启停操作的响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerActionResponse {
    pub success: bool,
    pub message: String,
    pub topic: String,
}

/// 监听状态查询的响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatusResponse {
    pub listening: bool,
    pub topic: String,
}

/// 构建监听器管理路由
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/listeners", get(list_listeners))
        .route("/api/listeners/{topic}", get(listener_status))
        .route("/api/listeners/{topic}/start", post(start_listener))
        .route("/api/listeners/{topic}/stop", post(stop_listener))
}

/// POST /api/listeners/{topic}/start
async fn start_listener(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> Json<ListenerActionResponse> {
    let started = state.manager.start_listening(&topic);
    Json(ListenerActionResponse {
        success: started,
        message: if started {
            format!("已开始监听 topic: {topic}")
        } else {
            format!("启动失败或已在监听 topic: {topic}")
        },
        topic,
    })
}

/// POST /api/listeners/{topic}/stop
async fn stop_listener(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> Json<ListenerActionResponse> {
    let stopped = state.manager.stop_listening(&topic);
    Json(ListenerActionResponse {
        success: stopped,
        message: if stopped {
            format!("已停止监听 topic: {topic}")
        } else {
            format!("停止失败或未在监听 topic: {topic}")
        },
        topic,
    })
}

/// GET /api/listeners/{topic}
async fn listener_status(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> Json<ListenerStatusResponse> {
    let listening = state.manager.is_listening(&topic);
    Json(ListenerStatusResponse { listening, topic })
}

/// GET /api/listeners
async fn list_listeners(State(state): State<AppState>) -> Json<Vec<ListenerInfo>> {
    Json(state.manager.active_listeners())
}

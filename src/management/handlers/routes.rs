//! 路由表读写处理器
//!
//! `GET /route` 返回当前快照（有序的条目数组）；`POST /route` 以同样形状的数组整体替换路由表，
//! 返回替换后的快照。任意一条非法则整表拒绝，旧表保持不变。

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};

use crate::error::ProxyError;
use crate::logging::{LogComponent, LogStage};
use crate::management::response;
use crate::management::server::ManagementState;
use crate::proxy::route_table::{RouteEntry, validate_entries};
use crate::{linfo, lwarn};

/// 读取路由表快照
pub async fn get_routes(State(state): State<ManagementState>) -> Response {
    let snapshot = state.routes.snapshot();
    Json(snapshot.as_slice()).into_response()
}

/// 整体替换路由表
pub async fn replace_routes(
    State(state): State<ManagementState>,
    payload: std::result::Result<Json<Vec<RouteEntry>>, JsonRejection>,
) -> Response {
    let entries = match payload {
        Ok(Json(entries)) => entries,
        Err(rejection) => {
            lwarn!(
                "system",
                LogStage::Management,
                LogComponent::Management,
                "route_payload_rejected",
                "路由表请求体无法解析",
                error = %rejection
            );
            return response::app_error(ProxyError::validation(rejection.body_text(), None));
        }
    };

    if let Err(error) = validate_entries(&entries) {
        lwarn!(
            "system",
            LogStage::Management,
            LogComponent::Management,
            "route_validation_failed",
            "路由表校验失败，保持原表",
            error = %error
        );
        return response::app_error(error);
    }

    let previous = state.routes.snapshot().len();
    let snapshot = state.routes.replace(entries);
    linfo!(
        "system",
        LogStage::Management,
        LogComponent::Management,
        "routes_replaced",
        "管理端替换了路由表",
        previous = previous,
        current = snapshot.len()
    );

    Json(snapshot.as_slice()).into_response()
}

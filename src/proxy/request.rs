//! # 入站请求
//!
//! 从 axum 请求中提取网关需要的全部信息。入站请求体是只读一次的流，
//! 准入通过后一次性缓冲，之后每次重试都复用同一份字节。

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, header};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::net::IpAddr;
use tokio_util::sync::CancellationToken;

use crate::error::{ProxyError, Result};

/// 请求 ID 头
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 入站请求的网关视图（请求内局部数据）
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// 请求 ID
    pub request_id: String,
    /// HTTP 方法
    pub method: Method,
    /// 去掉路径基址后的路径
    pub path: String,
    /// 查询串（不含 `?`）
    pub query: Option<String>,
    /// 网关挂载的路径基址
    pub path_base: Option<String>,
    /// 入站请求头
    pub headers: HeaderMap,
    /// 请求的 Host
    pub host: Option<String>,
    /// 请求协议
    pub scheme: String,
    /// 客户端 IP
    pub client_ip: Option<IpAddr>,
    /// 已缓冲的请求体，空请求体为 `None`
    pub body: Option<Bytes>,
}

impl InboundRequest {
    /// 创建不带请求体的请求（路径可含查询串）
    #[must_use]
    pub fn new(method: Method, path_and_query: &str) -> Self {
        let (path, query) = split_path_and_query(path_and_query);
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            path,
            query,
            path_base: None,
            headers: HeaderMap::new(),
            host: None,
            scheme: "http".to_string(),
            client_ip: None,
            body: None,
        }
    }

    /// 从请求头部构建（不读取请求体），剥离路径基址
    ///
    /// 准入校验只依赖这里的字段；请求体在准入通过后由 [`Self::read_body`] 读取。
    #[must_use]
    pub fn from_parts(
        parts: Parts,
        request_id: String,
        client_ip: Option<IpAddr>,
        path_base: Option<&str>,
    ) -> Self {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
            .or_else(|| parts.uri.authority().map(ToString::to_string));

        let scheme = parts.uri.scheme_str().unwrap_or("http").to_string();

        let (path, path_base) = strip_path_base(parts.uri.path(), path_base);
        let query = parts.uri.query().map(ToString::to_string);

        Self {
            request_id,
            method: parts.method,
            path,
            query,
            path_base,
            headers: parts.headers,
            host,
            scheme,
            client_ip,
            body: None,
        }
    }

    /// 缓冲请求体，超过上限返回 413；调用方断开时返回取消错误
    pub async fn read_body(
        &mut self,
        body: Body,
        max_body_bytes: usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let declared_length = self
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());
        if declared_length.is_some_and(|length| length > max_body_bytes) {
            return Err(ProxyError::PayloadTooLarge {
                limit: max_body_bytes,
            });
        }

        self.body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ProxyError::cancelled("读取请求体时调用方断开")),
            body = buffer_body(body, max_body_bytes) => body?,
        };
        Ok(())
    }

    /// 路径 + 查询串
    #[must_use]
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        }
    }
}

/// 取入站 `x-request-id`，缺失时生成新的 UUID
#[must_use]
pub fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), ToString::to_string)
}

/// 读取完整请求体，超过上限时返回 413 错误
async fn buffer_body(body: Body, max_body_bytes: usize) -> Result<Option<Bytes>> {
    let mut stream = body.into_data_stream();
    let mut buffer = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| ProxyError::network_with_source("读取入站请求体失败", e))?;
        if buffer.len() + chunk.len() > max_body_bytes {
            return Err(ProxyError::PayloadTooLarge {
                limit: max_body_bytes,
            });
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(if buffer.is_empty() {
        None
    } else {
        Some(buffer.freeze())
    })
}

fn split_path_and_query(path_and_query: &str) -> (String, Option<String>) {
    match path_and_query.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (path_and_query.to_string(), None),
    }
}

/// 剥离路径基址；基址只在完整路径段边界上匹配
fn strip_path_base(path: &str, path_base: Option<&str>) -> (String, Option<String>) {
    let Some(base) = path_base
        .map(|base| base.trim_end_matches('/'))
        .filter(|base| !base.is_empty())
    else {
        return (path.to_string(), None);
    };

    match path.strip_prefix(base) {
        Some("") => ("/".to_string(), Some(base.to_string())),
        Some(rest) if rest.starts_with('/') => (rest.to_string(), Some(base.to_string())),
        _ => (path.to_string(), None),
    }
}

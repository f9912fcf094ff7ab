//! # 上游客户端
//!
//! 所有上游调用共用一个显式构造、注入到执行器中的连接池客户端。
//! 客户端不跟随重定向，3xx 原样回写给调用方。

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use std::time::Duration;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};

/// 出站请求
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// 缓冲的入站请求体，每次重试复用
    pub body: Option<Bytes>,
}

/// 上游响应，响应体保持流式
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Body>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }
}

/// 上游 HTTP 客户端
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// 发送一次请求；传输层失败返回 `ProxyError::Network`
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
}

/// 拼接端点地址与请求路径
///
/// 端点为空或不是 http(s) 地址时返回 `EndpointNotFound`。
pub fn build_url(endpoint: &str, path_and_query: &str) -> Result<Url> {
    let base = endpoint.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(ProxyError::endpoint_not_found("端点地址为空"));
    }

    let url = Url::parse(&format!("{base}{path_and_query}"))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(ProxyError::endpoint_not_found(format!(
            "端点地址不是可用的 HTTP 地址: {endpoint}"
        ))),
    }
}

/// 基于 reqwest 的连接池客户端
#[derive(Debug, Clone)]
pub struct ReqwestUpstreamClient {
    client: reqwest::Client,
}

impl ReqwestUpstreamClient {
    /// 按配置构建客户端
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .build()
            .map_err(|e| ProxyError::config_with_source("构建上游 HTTP 客户端失败", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let url = request.url.to_string();
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProxyError::network_with_source(format!("上游请求失败: {url}"), e))?;

        let status = response.status();
        let headers = response.headers().clone();
        Ok(UpstreamResponse::new(
            status,
            headers,
            Body::from_stream(response.bytes_stream()),
        ))
    }
}

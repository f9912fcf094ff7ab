//! # 响应回写
//!
//! 把最终的上游响应（状态码、过滤后的响应头、流式响应体）回写给调用方。
//! 回写失败单独归类为 `ProxyError::Relay`，不与上游失败混淆。

use axum::body::Body;
use axum::http::Response;

use crate::error::{ProxyError, Result};
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use crate::proxy::headers::HeaderRewriter;
use crate::proxy::upstream::UpstreamResponse;

/// 响应回写器
#[derive(Debug, Clone)]
pub struct ResponseRelay {
    rewriter: HeaderRewriter,
}

impl ResponseRelay {
    #[must_use]
    pub const fn new(rewriter: HeaderRewriter) -> Self {
        Self { rewriter }
    }

    /// 构建回写给调用方的响应
    ///
    /// `ProxyError::Relay` 只覆盖响应头与响应本身无法构造的情况。响应体交给 hyper
    /// 之后才开始流式写出，之后的写入失败（调用方断开、上游流中断）表现为连接中断，
    /// 不再回到这里。
    pub fn relay(&self, request_id: &str, upstream: UpstreamResponse) -> Result<Response<Body>> {
        let UpstreamResponse {
            status,
            headers,
            body,
        } = upstream;

        let headers = self
            .rewriter
            .inbound(&headers)
            .map_err(|e| ProxyError::relay_with_source("无法构造回写响应头", e))?;

        let mut response = Response::builder()
            .status(status)
            .body(body)
            .map_err(|e| ProxyError::relay_with_source("无法构造回写响应", e))?;
        *response.headers_mut() = headers;

        ldebug!(
            request_id,
            LogStage::Relay,
            LogComponent::Relay,
            "response_relayed",
            "上游响应已回写",
            status = status.as_u16(),
            headers = response.headers().len()
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn status_headers_and_body_are_relayed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        let upstream = UpstreamResponse::new(StatusCode::ACCEPTED, headers, "{\"id\":123}");

        let response = ResponseRelay::new(HeaderRewriter::new("gw"))
            .relay("req-1", upstream)
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::VIA], "1.1 gw");
        assert!(!response.headers().contains_key(header::CONNECTION));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"{\"id\":123}");
    }

    #[tokio::test]
    async fn mid_stream_failure_surfaces_from_the_body_not_the_relay() {
        let chunks: Vec<std::io::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"partial")),
            Err(std::io::Error::other("upstream reset")),
        ];
        let body = Body::from_stream(futures::stream::iter(chunks));
        let upstream = UpstreamResponse::new(StatusCode::OK, HeaderMap::new(), body);

        let response = ResponseRelay::new(HeaderRewriter::new("gw"))
            .relay("req-1", upstream)
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(axum::body::to_bytes(response.into_body(), usize::MAX).await.is_err());
    }

    #[test]
    fn unrepresentable_gateway_host_is_a_relay_error() {
        let upstream = UpstreamResponse::new(StatusCode::OK, HeaderMap::new(), Body::empty());
        let err = ResponseRelay::new(HeaderRewriter::new("bad\nhost"))
            .relay("req-1", upstream)
            .unwrap_err();

        assert!(matches!(err, ProxyError::Relay { .. }));
        assert_eq!(err.to_http_response_parts().1, "RELAY_SINK_ERROR");
    }
}

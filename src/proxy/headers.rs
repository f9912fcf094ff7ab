//! # 代理头改写
//!
//! 出站方向：过滤逐跳头，追加 `Forwarded` / `Via` / `X-Forwarded-*`，写入身份头。
//! 入站方向：过滤响应头并追加 `Via`。两个方向都是纯函数。

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::net::IpAddr;

use crate::error::{ProxyError, Result};
use crate::proxy::identity::{IDENTITY_HEADER, IdentityModel};
use crate::proxy::request::InboundRequest;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_PATH_BASE: HeaderName = HeaderName::from_static("x-forwarded-pathbase");
pub const PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");

/// 不向上游转发的请求头
const REQUEST_IGNORED: [HeaderName; 9] = [
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::DATE,
    header::EXPECT,
    header::HOST,
    header::IF_MODIFIED_SINCE,
    header::RANGE,
    header::TRANSFER_ENCODING,
    PROXY_CONNECTION,
];

/// 不回写给调用方的响应头
const RESPONSE_IGNORED: [HeaderName; 4] = [
    header::CONNECTION,
    header::DATE,
    header::SERVER,
    header::TRANSFER_ENCODING,
];

/// 代理头改写器
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    gateway_host_name: String,
}

impl HeaderRewriter {
    pub fn new(gateway_host_name: impl Into<String>) -> Self {
        Self {
            gateway_host_name: gateway_host_name.into(),
        }
    }

    #[must_use]
    pub fn gateway_host_name(&self) -> &str {
        &self.gateway_host_name
    }

    /// 构建出站请求头
    pub fn outbound(&self, request: &InboundRequest, identity: &IdentityModel) -> Result<HeaderMap> {
        let mut headers = HeaderMap::with_capacity(request.headers.len() + 8);
        for (name, value) in &request.headers {
            if REQUEST_IGNORED.contains(name) || name.as_str() == IDENTITY_HEADER {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        headers.append(header::VIA, self.via()?);
        headers.append(header::FORWARDED, self.forwarded(request)?);

        if !headers.contains_key(&X_FORWARDED_HOST) {
            if let Some(host) = &request.host {
                headers.insert(X_FORWARDED_HOST, header_value(host)?);
            }
        }
        if !headers.contains_key(&X_FORWARDED_PROTO) {
            headers.insert(X_FORWARDED_PROTO, header_value(&request.scheme)?);
        }

        if let Some(client_ip) = request.client_ip {
            let existing = headers
                .get_all(&X_FORWARDED_FOR)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .collect::<Vec<_>>()
                .join(",");
            let forwarded_for = if existing.is_empty() {
                client_ip.to_string()
            } else {
                format!("{existing},{client_ip}")
            };
            headers.insert(X_FORWARDED_FOR, header_value(&forwarded_for)?);
        }

        if let Some(path_base) = request.path_base.as_deref().filter(|base| !base.is_empty()) {
            if !headers.contains_key(&X_FORWARDED_PATH_BASE) {
                headers.insert(X_FORWARDED_PATH_BASE, header_value(path_base)?);
            }
        }

        headers.insert(
            HeaderName::from_static(IDENTITY_HEADER),
            header_value(&identity.to_header_value()?)?,
        );

        Ok(headers)
    }

    /// 构建回写给调用方的响应头
    pub fn inbound(&self, upstream: &HeaderMap) -> Result<HeaderMap> {
        let mut headers = HeaderMap::with_capacity(upstream.len() + 1);
        for (name, value) in upstream {
            if !RESPONSE_IGNORED.contains(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        headers.append(header::VIA, self.via()?);
        Ok(headers)
    }

    fn via(&self) -> Result<HeaderValue> {
        header_value(&format!("1.1 {}", self.gateway_host_name))
    }

    /// RFC 7239 `Forwarded` 元素
    fn forwarded(&self, request: &InboundRequest) -> Result<HeaderValue> {
        let mut pairs = vec![format!("by=_{}", self.gateway_host_name)];
        if let Some(client_ip) = request.client_ip {
            pairs.push(format!("for={}", forwarded_node(client_ip)));
        }
        if let Some(host) = &request.host {
            pairs.push(format!("host={host}"));
        }
        pairs.push(format!("proto={}", request.scheme));
        header_value(&pairs.join(";"))
    }
}

/// IPv6 地址需加方括号并引号包裹
fn forwarded_node(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("\"[{v6}]\""),
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        ProxyError::internal_with_source(format!("无法构造请求头值: {value}"), e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use pretty_assertions::assert_eq;

    fn inbound(client_ip: Option<&str>) -> InboundRequest {
        let mut request = InboundRequest::new(Method::POST, "/orders/1");
        request.host = Some("api.example.com".to_string());
        request.scheme = "https".to_string();
        request.client_ip = client_ip.map(|ip| ip.parse().unwrap());
        request
    }

    fn values(headers: &HeaderMap, name: impl header::AsHeaderName) -> Vec<&str> {
        headers.get_all(name).iter().map(|v| v.to_str().unwrap()).collect()
    }

    #[test]
    fn hop_by_hop_headers_are_not_forwarded() {
        let mut request = inbound(Some("5.6.7.8"));
        for (name, value) in [
            ("host", "api.example.com"),
            ("content-length", "12"),
            ("connection", "keep-alive"),
            ("proxy-connection", "keep-alive"),
            ("range", "bytes=0-1"),
            ("x-custom", "kept"),
        ] {
            request.headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        let headers = HeaderRewriter::new("gw").outbound(&request, &IdentityModel::empty()).unwrap();
        for dropped in ["host", "content-length", "connection", "proxy-connection", "range"] {
            assert!(!headers.contains_key(dropped), "{dropped} leaked");
        }
        assert_eq!(values(&headers, "x-custom"), vec!["kept"]);
    }

    #[test]
    fn forwarded_for_is_comma_joined() {
        let mut request = inbound(Some("5.6.7.8"));
        request.headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("1.2.3.4"));

        let headers = HeaderRewriter::new("gw").outbound(&request, &IdentityModel::empty()).unwrap();
        assert_eq!(values(&headers, X_FORWARDED_FOR), vec!["1.2.3.4,5.6.7.8"]);

        let fresh = HeaderRewriter::new("gw")
            .outbound(&inbound(Some("5.6.7.8")), &IdentityModel::empty())
            .unwrap();
        assert_eq!(values(&fresh, X_FORWARDED_FOR), vec!["5.6.7.8"]);

        let unknown_client = HeaderRewriter::new("gw")
            .outbound(&inbound(None), &IdentityModel::empty())
            .unwrap();
        assert!(!unknown_client.contains_key(X_FORWARDED_FOR));
    }

    #[test]
    fn forwarded_and_via_accumulate_across_hops() {
        let mut request = inbound(Some("2001:db8::1"));
        request.headers.append(header::FORWARDED, HeaderValue::from_static("for=9.9.9.9"));
        request.headers.append(header::VIA, HeaderValue::from_static("1.1 edge"));

        let headers = HeaderRewriter::new("gw").outbound(&request, &IdentityModel::empty()).unwrap();
        assert_eq!(
            values(&headers, header::FORWARDED),
            vec![
                "for=9.9.9.9",
                "by=_gw;for=\"[2001:db8::1]\";host=api.example.com;proto=https"
            ]
        );
        assert_eq!(values(&headers, header::VIA), vec!["1.1 edge", "1.1 gw"]);
    }

    #[test]
    fn first_hop_forwarded_host_and_proto_are_preserved() {
        let mut request = inbound(None);
        request.headers.insert(X_FORWARDED_HOST, HeaderValue::from_static("edge.example.com"));

        let headers = HeaderRewriter::new("gw").outbound(&request, &IdentityModel::empty()).unwrap();
        assert_eq!(values(&headers, X_FORWARDED_HOST), vec!["edge.example.com"]);
        assert_eq!(values(&headers, X_FORWARDED_PROTO), vec!["https"]);
    }

    #[test]
    fn path_base_is_announced_once() {
        let mut request = inbound(None);
        request.path_base = Some("/api".to_string());
        let headers = HeaderRewriter::new("gw").outbound(&request, &IdentityModel::empty()).unwrap();
        assert_eq!(values(&headers, X_FORWARDED_PATH_BASE), vec!["/api"]);

        request.path_base = None;
        let headers = HeaderRewriter::new("gw").outbound(&request, &IdentityModel::empty()).unwrap();
        assert!(!headers.contains_key(X_FORWARDED_PATH_BASE));
    }

    #[test]
    fn identity_header_replaces_inbound_value() {
        let mut request = inbound(None);
        request
            .headers
            .insert(IDENTITY_HEADER, HeaderValue::from_static("c3Bvb2ZlZA=="));
        let identity = IdentityModel::create("acme", "bob", "e-1", None);

        let headers = HeaderRewriter::new("gw").outbound(&request, &identity).unwrap();
        let forwarded = values(&headers, IDENTITY_HEADER);
        assert_eq!(forwarded.len(), 1);
        assert_eq!(IdentityModel::from_header_value(forwarded[0]).unwrap(), identity);
    }

    #[test]
    fn response_headers_are_filtered_and_tagged() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::SERVER, HeaderValue::from_static("kestrel"));
        upstream.insert(header::DATE, HeaderValue::from_static("Tue, 01 Jan 2030 00:00:00 GMT"));
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        let headers = HeaderRewriter::new("gw").inbound(&upstream).unwrap();
        assert!(!headers.contains_key(header::SERVER));
        assert!(!headers.contains_key(header::DATE));
        assert!(!headers.contains_key(header::TRANSFER_ENCODING));
        assert_eq!(values(&headers, header::SET_COOKIE), vec!["a=1", "b=2"]);
        assert_eq!(values(&headers, header::VIA), vec!["1.1 gw"]);
    }
}

//! # 网关端到端测试
//!
//! 通过 `tower::ServiceExt::oneshot` 驱动完整的代理路由与管理路由，
//! 上游由 wiremock 模拟：
//! 1. 准入校验
//! 2. 分区解析与分区迁移
//! 3. 重试与失败映射
//! 4. 管理端热替换路由表

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

use partition_gateway::auth::{ClaimsTenantResolver, GatewayClaims, JwtAuthenticator};
use partition_gateway::config::{
    AuthConfig, GatewayConfig, PartitionRegistration, RetryConfig, ServiceRegistration,
    UpstreamConfig,
};
use partition_gateway::discovery::StaticDiscovery;
use partition_gateway::management::server::{ManagementState, create_router as management_router};
use partition_gateway::proxy::{
    GatewayCollaborators, GatewayService, IDENTITY_HEADER, IdentityModel, PartitionHasher,
    ProxyState, ReqwestUpstreamClient, RetryPolicy, RouteEntry, RouteTable, create_router,
};

const SECRET: &str = "e2e-secret";
const HOST_NAME: &str = "gw-test";

struct TestGateway {
    proxy: Router,
    management: Router,
    discovery: Arc<StaticDiscovery>,
}

struct GatewayBuilder {
    routes: Vec<RouteEntry>,
    services: Vec<ServiceRegistration>,
    gateway: GatewayConfig,
    retry: RetryConfig,
}

impl GatewayBuilder {
    fn new() -> Self {
        Self {
            routes: Vec::new(),
            services: Vec::new(),
            gateway: GatewayConfig {
                host_name: HOST_NAME.to_string(),
                ..GatewayConfig::default()
            },
            retry: RetryConfig {
                max_retries: 3,
                base_delay_ms: 1,
                max_delay_ms: 10,
            },
        }
    }

    fn route(mut self, route: RouteEntry) -> Self {
        self.routes.push(route);
        self
    }

    fn service(mut self, service_uri: &str, partitions: Vec<PartitionRegistration>) -> Self {
        self.services.push(ServiceRegistration {
            service_uri: service_uri.to_string(),
            partitions,
        });
        self
    }

    fn build(self) -> TestGateway {
        let routes = Arc::new(RouteTable::with_routes(self.routes));
        let discovery = Arc::new(StaticDiscovery::new(self.services));

        let service = GatewayService::new(
            GatewayCollaborators {
                routes: Arc::clone(&routes),
                discovery: discovery.clone(),
                client: Arc::new(ReqwestUpstreamClient::new(&UpstreamConfig::default()).unwrap()),
                authenticator: Arc::new(JwtAuthenticator::new(&auth_config()).unwrap()),
                tenant_resolver: Arc::new(ClaimsTenantResolver),
            },
            &self.gateway,
            RetryPolicy::from(&self.retry),
        );

        TestGateway {
            proxy: create_router(
                ProxyState::new(Arc::clone(&routes), Arc::clone(&discovery), service),
                &self.gateway,
            ),
            management: management_router(ManagementState::new(routes, Arc::clone(&discovery))),
            discovery,
        }
    }
}

fn auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: SECRET.to_string(),
        issuer: None,
        audience: None,
        leeway_seconds: 0,
    }
}

fn bearer(org: Option<&str>) -> String {
    let mut claims = GatewayClaims::new("bob", 3600);
    if let Some(org) = org {
        claims = claims.with_org(org);
    }
    let token = JwtAuthenticator::new(&auth_config())
        .unwrap()
        .issue(&claims)
        .unwrap();
    format!("Bearer {token}")
}

fn get(uri: &str, authorization: Option<String>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// 两个分区：低位不可达，高位指向 `high`
fn orders_partitions(high: &str) -> Vec<PartitionRegistration> {
    vec![
        PartitionRegistration::ranged(0, 63, "http://127.0.0.1:1"),
        PartitionRegistration::ranged(64, 127, high),
    ]
}

#[tokio::test]
async fn partitioned_request_reaches_the_tenant_partition() {
    // "acme" 落在高位分区
    assert_eq!(PartitionHasher::default().resolve("acme"), 118);

    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 123})))
        .expect(1)
        .mount(&upstream)
        .await;

    let gateway = GatewayBuilder::new()
        .route(RouteEntry::new("/orders", "svc:orders").partitioned(true))
        .service("svc:orders", orders_partitions(&upstream.uri()))
        .build();

    let response = gateway
        .proxy
        .oneshot(get("/orders/123", Some(bearer(Some("acme")))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::VIA], format!("1.1 {HOST_NAME}"));
    assert_eq!(body_json(response).await, json!({"id": 123}));

    let received = upstream.received_requests().await.unwrap();
    let forwarded = &received[0];
    let identity = IdentityModel::from_header_value(
        forwarded.headers[IDENTITY_HEADER].to_str().unwrap(),
    )
    .unwrap();
    assert_eq!(identity.organization_prefix(), "acme");
    assert_eq!(
        forwarded.headers[header::VIA].to_str().unwrap(),
        format!("1.1 {HOST_NAME}")
    );
    assert!(
        forwarded.headers[header::FORWARDED]
            .to_str()
            .unwrap()
            .starts_with(&format!("by=_{HOST_NAME}"))
    );
}

#[tokio::test]
async fn admission_failures_never_reach_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let gateway = GatewayBuilder::new()
        .route(RouteEntry::new("/orders", "svc:orders").partitioned(true))
        .route(RouteEntry::new("/public", "svc:orders").partitioned(true).open(true))
        .service("svc:orders", orders_partitions(&upstream.uri()))
        .build();

    let cases = [
        (get("/nowhere", Some(bearer(Some("acme")))), StatusCode::NOT_FOUND),
        (get("/orders/1", None), StatusCode::UNAUTHORIZED),
        (get("/orders/1", Some("Bearer not-a-jwt".to_string())), StatusCode::UNAUTHORIZED),
        (get("/orders/1", Some(bearer(None))), StatusCode::FORBIDDEN),
        (get("/public/1", None), StatusCode::BAD_REQUEST),
    ];

    for (request, expected) in cases {
        let uri = request.uri().to_string();
        let response = gateway.proxy.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), expected, "{uri}");
        assert!(body_bytes(response).await.is_empty(), "{uri}");
    }
}

#[tokio::test]
async fn open_route_uses_the_named_listener() {
    let web = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalog/items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("items"))
        .expect(1)
        .mount(&web)
        .await;

    let mut partition = PartitionRegistration::singleton("http://127.0.0.1:1");
    partition.listeners.clear();
    partition.listeners.insert("web".to_string(), web.uri());
    partition
        .listeners
        .insert("grpc".to_string(), "http://127.0.0.1:1".to_string());

    let gateway = GatewayBuilder::new()
        .route(RouteEntry::new("/catalog", "svc:catalog").open(true).with_listener("Web"))
        .service("svc:catalog", vec![partition])
        .build();

    let response = gateway
        .proxy
        .oneshot(get("/catalog/items", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"items");
}

/// 应答 503 之前把分区迁移到新端点
struct MovePartition {
    discovery: Arc<StaticDiscovery>,
    target: String,
}

impl Respond for MovePartition {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        self.discovery.update_service(ServiceRegistration {
            service_uri: "svc:orders".to_string(),
            partitions: orders_partitions(&self.target),
        });
        ResponseTemplate::new(503)
    }
}

#[tokio::test]
async fn stale_partition_is_re_resolved_after_503() {
    let old = MockServer::start().await;
    let new = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .expect(1)
        .mount(&new)
        .await;

    let gateway = GatewayBuilder::new()
        .route(RouteEntry::new("/orders", "svc:orders").partitioned(true))
        .service("svc:orders", orders_partitions(&old.uri()))
        .build();

    Mock::given(method("GET"))
        .respond_with(MovePartition {
            discovery: Arc::clone(&gateway.discovery),
            target: new.uri(),
        })
        .expect(1)
        .mount(&old)
        .await;

    let version = gateway.discovery.version();
    let response = gateway
        .proxy
        .oneshot(get("/orders/9", Some(bearer(Some("acme")))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"moved");
    assert!(gateway.discovery.version() > version);
}

#[tokio::test]
async fn server_errors_are_retried_on_the_same_endpoint() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .mount(&upstream)
        .await;

    let gateway = GatewayBuilder::new()
        .route(RouteEntry::new("/orders", "svc:orders").partitioned(true))
        .service("svc:orders", orders_partitions(&upstream.uri()))
        .build();

    let request = Request::post("/orders")
        .header(header::AUTHORIZATION, bearer(Some("acme")))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"qty":2}"#))
        .unwrap();
    let response = gateway.proxy.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);
    assert!(received.iter().all(|request| request.body == br#"{"qty":2}"#));
}

#[tokio::test]
async fn exhausted_retries_relay_the_last_upstream_response() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("still down"))
        .expect(4)
        .mount(&upstream)
        .await;

    let gateway = GatewayBuilder::new()
        .route(RouteEntry::new("/orders", "svc:orders").partitioned(true))
        .service("svc:orders", orders_partitions(&upstream.uri()))
        .build();

    let response = gateway
        .proxy
        .oneshot(get("/orders/1", Some(bearer(Some("acme")))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_bytes(response).await, b"still down");
}

#[tokio::test]
async fn unreachable_upstream_is_a_json_bad_gateway() {
    let gateway = GatewayBuilder::new()
        .route(RouteEntry::new("/orders", "svc:orders").partitioned(true))
        .service("svc:orders", orders_partitions("http://127.0.0.1:1"))
        .build();

    let response = gateway
        .proxy
        .oneshot(get("/orders/1", Some(bearer(Some("acme")))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NETWORK_ERROR");
}

#[tokio::test]
async fn unknown_service_is_a_discovery_error() {
    let gateway = GatewayBuilder::new()
        .route(RouteEntry::new("/orders", "svc:missing").open(true))
        .build();

    let response = gateway.proxy.oneshot(get("/orders", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"]["code"], "DISCOVERY_ERROR");
}

#[tokio::test]
async fn oversized_bodies_are_rejected_before_upstream() {
    let mut builder = GatewayBuilder::new()
        .route(RouteEntry::new("/orders", "svc:orders").open(true))
        .service("svc:orders", vec![PartitionRegistration::singleton("http://127.0.0.1:1")]);
    builder.gateway.max_body_bytes = 4;
    let gateway = builder.build();

    let request = Request::post("/orders")
        .header(header::CONTENT_LENGTH, "10")
        .body(Body::from("0123456789"))
        .unwrap();
    let response = gateway.proxy.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn admission_is_decided_before_the_body_is_read() {
    let mut builder = GatewayBuilder::new()
        .route(RouteEntry::new("/orders", "svc:orders"))
        .service("svc:orders", vec![PartitionRegistration::singleton("http://127.0.0.1:1")]);
    builder.gateway.max_body_bytes = 4;
    let gateway = builder.build();

    let cases = [("/nowhere", StatusCode::NOT_FOUND), ("/orders", StatusCode::UNAUTHORIZED)];

    for (uri, expected) in cases {
        let request = Request::post(uri)
            .header(header::CONTENT_LENGTH, "10")
            .body(Body::from("0123456789"))
            .unwrap();
        let response = gateway.proxy.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), expected, "{uri}");
        assert!(body_bytes(response).await.is_empty(), "{uri}");
    }
}

#[tokio::test]
async fn path_base_is_stripped_and_announced() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/7"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut builder = GatewayBuilder::new()
        .route(RouteEntry::new("/orders", "svc:orders").open(true))
        .service("svc:orders", vec![PartitionRegistration::singleton(upstream.uri())]);
    builder.gateway.path_base = Some("/api".to_string());
    let gateway = builder.build();

    let response = gateway.proxy.oneshot(get("/api/orders/7", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received[0].headers["x-forwarded-pathbase"], "/api");
}

#[tokio::test]
async fn admin_replacement_is_visible_to_the_next_request() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&upstream)
        .await;

    let gateway = GatewayBuilder::new()
        .service("svc:hello", vec![PartitionRegistration::singleton(upstream.uri())])
        .build();

    let before = gateway.proxy.clone().oneshot(get("/hello", None)).await.unwrap();
    assert_eq!(before.status(), StatusCode::NOT_FOUND);

    let payload = json!([{"pathMatcher": "/hello", "serviceUri": "svc:hello", "isOpen": true}]);
    let replaced = gateway
        .management
        .clone()
        .oneshot(
            Request::post("/route")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(replaced.status(), StatusCode::OK);
    assert_eq!(body_json(replaced).await[0]["serviceUri"], "svc:hello");

    let listed = gateway.management.oneshot(get("/route", None)).await.unwrap();
    assert_eq!(body_json(listed).await.as_array().unwrap().len(), 1);

    let after = gateway.proxy.oneshot(get("/hello/world", None)).await.unwrap();
    assert_eq!(after.status(), StatusCode::OK);
    assert_eq!(body_bytes(after).await, b"hello");
}

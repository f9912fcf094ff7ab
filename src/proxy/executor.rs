//! # 重试代理执行器
//!
//! 每次请求的状态机：构建 → 发送 → {成功, 可重试, 耗尽}。
//!
//! - 出站请求头只改写一次，请求体使用预先缓冲的字节，每次尝试复用。
//! - 503 触发重新解析分区并立即重试新端点，其余 5xx 与传输失败退避后重试同一端点。
//! - 重试耗尽时原样返回最后一次结果，不构造网关错误。
//! - 等待、服务发现与上游调用都监听取消信号，调用方断开后不再发起新的尝试。

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::proxy::endpoint_resolver::{EndpointResolver, ResolvedPartition};
use crate::proxy::headers::HeaderRewriter;
use crate::proxy::identity::IdentityModel;
use crate::proxy::request::InboundRequest;
use crate::proxy::retry_policy::{
    CallOutcome, RetryPolicy, log_retry_decision, log_retry_skipped,
};
use crate::proxy::route_table::RouteEntry;
use crate::proxy::upstream::{UpstreamClient, UpstreamRequest, UpstreamResponse, build_url};
use crate::{ldebug, linfo, lwarn};

/// 一次代理调用的执行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// 发起的上游调用次数
    pub attempts: u32,
    /// 重新解析次数
    pub re_resolutions: u32,
    /// 退避等待次数
    pub backoff_waits: u32,
}

impl ExecutionReport {
    /// 已发起的重试次数
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// 最终上游响应及执行统计
#[derive(Debug)]
pub struct ProxyOutcome {
    pub response: UpstreamResponse,
    pub report: ExecutionReport,
}

/// 重试代理执行器
pub struct RetryingProxyExecutor {
    client: Arc<dyn UpstreamClient>,
    resolver: Arc<EndpointResolver>,
    rewriter: HeaderRewriter,
    policy: RetryPolicy,
}

impl RetryingProxyExecutor {
    #[must_use]
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        resolver: Arc<EndpointResolver>,
        rewriter: HeaderRewriter,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            resolver,
            rewriter,
            policy,
        }
    }

    /// 执行代理调用
    ///
    /// `partition` 是已解析的初始分区。返回 `Ok` 时响应可能是任意状态码
    /// （包括耗尽重试后的 5xx）；`Err` 只用于传输失败耗尽、端点缺失、服务发现失败与取消。
    pub async fn execute(
        &self,
        request: &InboundRequest,
        identity: &IdentityModel,
        route: &RouteEntry,
        partition: ResolvedPartition,
        cancel: &CancellationToken,
    ) -> Result<ProxyOutcome> {
        let request_id = request.request_id.as_str();
        let listener = route.listener_name.as_deref();
        let headers = self.rewriter.outbound(request, identity)?;
        let path_and_query = request.path_and_query();

        let mut partition = partition;
        let mut endpoint = EndpointResolver::extract_endpoint(&partition, listener)?;
        let mut report = ExecutionReport::default();

        loop {
            ensure_not_cancelled(cancel)?;

            let upstream_request = UpstreamRequest {
                method: request.method.clone(),
                url: build_url(&endpoint, &path_and_query)?,
                headers: headers.clone(),
                body: request.body.clone(),
            };
            report.attempts += 1;

            ldebug!(
                request_id,
                LogStage::UpstreamRequest,
                LogComponent::Executor,
                "upstream_attempt",
                "发送上游请求",
                url = %upstream_request.url,
                method = %upstream_request.method,
                attempt = report.attempts
            );

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(caller_gone()),
                result = self.client.send(upstream_request) => result,
            };

            let failure = match CallOutcome::classify(result) {
                CallOutcome::Success(response) => {
                    linfo!(
                        request_id,
                        LogStage::UpstreamRequest,
                        LogComponent::Executor,
                        "upstream_completed",
                        "上游调用完成",
                        status = response.status.as_u16(),
                        attempts = report.attempts,
                        re_resolutions = report.re_resolutions
                    );
                    return Ok(ProxyOutcome { response, report });
                }
                CallOutcome::Fatal(error) => return Err(error),
                CallOutcome::Retryable(failure) => failure,
            };

            let decision = self.policy.decide(&failure, report.retries());
            if !decision.should_retry {
                log_retry_skipped(
                    request_id,
                    &failure,
                    &decision,
                    report.attempts,
                    self.policy.max_retries,
                );
                lwarn!(
                    request_id,
                    LogStage::Retry,
                    LogComponent::Executor,
                    "retries_exhausted",
                    "重试耗尽，返回最后一次上游结果",
                    status_code = failure.status().map(|status| status.as_u16()),
                    attempts = report.attempts
                );
                return failure
                    .into_result()
                    .map(|response| ProxyOutcome { response, report });
            }

            log_retry_decision(
                request_id,
                &failure,
                &decision,
                report.attempts,
                self.policy.max_retries,
            );
            // 丢弃失败响应，释放连接
            drop(failure);

            if decision.re_resolve {
                partition = self.resolver.re_resolve(request_id, &partition, cancel).await?;
                endpoint = EndpointResolver::extract_endpoint(&partition, listener)?;
                report.re_resolutions += 1;
            } else {
                report.backoff_waits += 1;
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(caller_gone()),
                    () = tokio::time::sleep(decision.delay) => {}
                }
            }
        }
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(caller_gone());
    }
    Ok(())
}

fn caller_gone() -> ProxyError {
    ProxyError::cancelled("调用方已断开，停止代理调用")
}

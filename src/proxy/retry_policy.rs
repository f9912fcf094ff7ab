//! # 重试策略评估
//!
//! 把一次上游调用的结果归类为 成功 / 可重试 / 终止，并对可重试结果给出决策：
//! 503 视为路由过期，立即重新解析；其他 5xx 与传输失败按指数退避重试同一端点。

use axum::http::StatusCode;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::proxy::upstream::UpstreamResponse;
use crate::{ldebug, linfo};

/// 默认最大重试次数（共 6 次尝试）
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// 默认退避基数
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
/// 默认退避上限
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// 可重试的失败
#[derive(Debug)]
pub enum RetryableFailure {
    /// 上游返回了 >= 500 的响应
    Response(UpstreamResponse),
    /// 传输层失败
    Transport(ProxyError),
}

impl RetryableFailure {
    /// 响应状态码（传输失败为 `None`）
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Response(response) => Some(response.status),
            Self::Transport(_) => None,
        }
    }

    /// 是否是路由过期信号
    #[must_use]
    pub fn is_stale_routing(&self) -> bool {
        self.status() == Some(StatusCode::SERVICE_UNAVAILABLE)
    }

    /// 放弃重试时原样交还最后一次结果
    pub fn into_result(self) -> Result<UpstreamResponse> {
        match self {
            Self::Response(response) => Ok(response),
            Self::Transport(error) => Err(error),
        }
    }
}

/// 单次上游调用结果
#[derive(Debug)]
pub enum CallOutcome {
    Success(UpstreamResponse),
    Retryable(RetryableFailure),
    Fatal(ProxyError),
}

impl CallOutcome {
    /// 归类一次调用结果
    #[must_use]
    pub fn classify(result: Result<UpstreamResponse>) -> Self {
        match result {
            Ok(response) if response.status.is_server_error() => {
                Self::Retryable(RetryableFailure::Response(response))
            }
            Ok(response) => Self::Success(response),
            Err(error @ ProxyError::Network { .. }) => {
                Self::Retryable(RetryableFailure::Transport(error))
            }
            Err(error) => Self::Fatal(error),
        }
    }
}

/// 重试决策结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// 是否应该重试
    pub should_retry: bool,
    /// 重试前等待时长
    pub delay: Duration,
    /// 是否先重新解析分区
    pub re_resolve: bool,
    /// 原因
    pub reason: RetryReason,
}

/// 重试决策原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// 达到重试上限
    MaxRetryExceeded,
    /// 未配置重试预算
    NoRetryBudget,
    /// 503：路由信息过期
    StaleRouting,
    /// 其他 5xx 或传输失败
    Transient,
}

impl RetryReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxRetryExceeded => "max_exceeded",
            Self::NoRetryBudget => "no_budget",
            Self::StaleRouting => "stale_routing",
            Self::Transient => "transient",
        }
    }
}

impl RetryDecision {
    /// 创建不重试的决策
    #[must_use]
    pub const fn no_retry(reason: RetryReason) -> Self {
        Self {
            should_retry: false,
            delay: Duration::ZERO,
            re_resolve: false,
            reason,
        }
    }

    /// 退避后重试同一端点
    #[must_use]
    pub const fn backoff(delay: Duration) -> Self {
        Self {
            should_retry: true,
            delay,
            re_resolve: false,
            reason: RetryReason::Transient,
        }
    }

    /// 不等待，重新解析后重试新端点
    #[must_use]
    pub const fn re_resolve() -> Self {
        Self {
            should_retry: true,
            delay: Duration::ZERO,
            re_resolve: true,
            reason: RetryReason::StaleRouting,
        }
    }
}

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// 第 `n` 次的退避时长：`min(max_delay, base_delay * 2^n)`
    #[must_use]
    pub fn backoff_delay(&self, n: u32) -> Duration {
        let factor = 1_u32.checked_shl(n).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// 对可重试失败给出决策；`retries_done` 为已经发起的重试次数
    #[must_use]
    pub fn decide(&self, failure: &RetryableFailure, retries_done: u32) -> RetryDecision {
        if self.max_retries == 0 {
            return RetryDecision::no_retry(RetryReason::NoRetryBudget);
        }
        if retries_done >= self.max_retries {
            return RetryDecision::no_retry(RetryReason::MaxRetryExceeded);
        }
        if failure.is_stale_routing() {
            return RetryDecision::re_resolve();
        }
        RetryDecision::backoff(self.backoff_delay(retries_done + 1))
    }
}

/// 默认策略下的退避时长
#[must_use]
pub fn backoff_delay(n: u32) -> Duration {
    RetryPolicy::default().backoff_delay(n)
}

/// 记录重试决策
pub fn log_retry_decision(
    request_id: &str,
    failure: &RetryableFailure,
    decision: &RetryDecision,
    attempt: u32,
    max_retries: u32,
) {
    linfo!(
        request_id,
        LogStage::Retry,
        LogComponent::Executor,
        "retry_scheduled",
        if decision.re_resolve {
            "上游返回 503，重新解析分区后立即重试"
        } else {
            "满足重试条件，退避后重试同一端点"
        },
        reason = decision.reason.as_str(),
        status_code = failure.status().map(|status| status.as_u16()),
        attempt = attempt,
        max_retries = max_retries,
        delay_ms = u64::try_from(decision.delay.as_millis()).unwrap_or(u64::MAX)
    );
}

/// 记录放弃重试
pub fn log_retry_skipped(
    request_id: &str,
    failure: &RetryableFailure,
    decision: &RetryDecision,
    attempt: u32,
    max_retries: u32,
) {
    let message = match decision.reason {
        RetryReason::NoRetryBudget => "未触发重试（未配置重试预算），返回最后一次结果",
        RetryReason::MaxRetryExceeded => "已达重试上限，返回最后一次结果",
        RetryReason::StaleRouting | RetryReason::Transient => "未触发重试",
    };

    ldebug!(
        request_id,
        LogStage::Retry,
        LogComponent::Executor,
        "retry_skipped",
        message,
        reason = decision.reason.as_str(),
        status_code = failure.status().map(|status| status.as_u16()),
        attempt = attempt,
        max_retries = max_retries
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderMap;
    use pretty_assertions::assert_eq;

    fn response(status: u16) -> UpstreamResponse {
        UpstreamResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            Body::empty(),
        )
    }

    #[test]
    fn backoff_doubles_from_half_a_second_and_caps() {
        let expected = [500, 1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 32_000];
        for (n, millis) in expected.into_iter().enumerate() {
            assert_eq!(
                backoff_delay(u32::try_from(n).unwrap()),
                Duration::from_millis(millis),
                "delay({n})"
            );
        }
        assert_eq!(backoff_delay(40), Duration::from_secs(32));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_secs(32));
    }

    #[test]
    fn classification_separates_server_errors() {
        assert!(matches!(CallOutcome::classify(Ok(response(200))), CallOutcome::Success(_)));
        assert!(matches!(CallOutcome::classify(Ok(response(404))), CallOutcome::Success(_)));
        assert!(matches!(CallOutcome::classify(Ok(response(302))), CallOutcome::Success(_)));
        assert!(matches!(
            CallOutcome::classify(Ok(response(500))),
            CallOutcome::Retryable(RetryableFailure::Response(_))
        ));
        assert!(matches!(
            CallOutcome::classify(Err(ProxyError::network("connection refused"))),
            CallOutcome::Retryable(RetryableFailure::Transport(_))
        ));
        assert!(matches!(
            CallOutcome::classify(Err(ProxyError::endpoint_not_found("no listener"))),
            CallOutcome::Fatal(_)
        ));
        assert!(matches!(
            CallOutcome::classify(Err(ProxyError::cancelled("gone"))),
            CallOutcome::Fatal(_)
        ));
    }

    #[test]
    fn service_unavailable_re_resolves_without_delay() {
        let policy = RetryPolicy::default();
        let decision = policy.decide(&RetryableFailure::Response(response(503)), 0);
        assert_eq!(decision, RetryDecision::re_resolve());
        assert_eq!(decision.delay, Duration::ZERO);
    }

    #[test]
    fn other_failures_back_off_by_retry_number() {
        let policy = RetryPolicy::default();
        let bad_gateway = RetryableFailure::Response(response(502));
        let transport = RetryableFailure::Transport(ProxyError::network("reset"));

        assert_eq!(policy.decide(&bad_gateway, 0).delay, Duration::from_secs(1));
        assert_eq!(policy.decide(&transport, 4).delay, Duration::from_secs(16));
        assert!(!policy.decide(&transport, 0).re_resolve);
    }

    #[test]
    fn budget_is_bounded() {
        let policy = RetryPolicy::default();
        let failure = RetryableFailure::Response(response(500));
        assert!(policy.decide(&failure, 4).should_retry);
        assert_eq!(
            policy.decide(&failure, 5),
            RetryDecision::no_retry(RetryReason::MaxRetryExceeded)
        );

        let none = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(
            none.decide(&failure, 0),
            RetryDecision::no_retry(RetryReason::NoRetryBudget)
        );
    }

    #[test]
    fn policy_follows_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_retries: 2,
            base_delay_ms: 10,
            max_delay_ms: 25,
        });
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(20));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(25));
        assert_eq!(policy.max_retries, 2);
    }
}

use crate::channel::{Channel, ChannelKind};
use bullet_core::{DeliveryError, Event, TemplateError};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// 单个渠道失败的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// 一次投递目标：命中的规则 + 渠道
#[derive(Clone)]
pub struct DispatchTarget {
    pub rule: String,
    pub channel: Arc<dyn Channel>,
}

impl DispatchTarget {
    pub fn new(rule: impl Into<String>, channel: Arc<dyn Channel>) -> Self {
        Self {
            rule: rule.into(),
            channel,
        }
    }
}

/// 单个目标的投递结果
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub rule: String,
    pub channel_type: ChannelKind,
    pub channel_name: String,
    /// 实际尝试次数；渲染失败时为 0
    pub attempts: u32,
    pub result: Result<(), ChannelError>,
}

impl Serialize for DispatchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DispatchOutcome", 6)?;
        state.serialize_field("rule", &self.rule)?;
        state.serialize_field("channel_type", &self.channel_type)?;
        state.serialize_field("channel_name", &self.channel_name)?;
        state.serialize_field("status", self.status())?;
        state.serialize_field("attempts", &self.attempts)?;
        state.serialize_field("error", &self.result.as_ref().err().map(|e| e.to_string()))?;
        state.end()
    }
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn status(&self) -> &'static str {
        match &self.result {
            Ok(()) => "success",
            Err(ChannelError::Template(_)) => "render_failed",
            Err(ChannelError::Delivery(_)) => "failed",
        }
    }
}

/// 投递策略
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// 单次投递超时
    pub timeout: Duration,
    /// 可重试错误的额外重试次数，0 表示不重试
    pub max_retries: u32,
    /// 首次重试前的等待，之后每次翻倍
    pub retry_backoff: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 0,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// 分发器
///
/// 一个事件的所有目标并发投递（每个目标一个 tokio 任务），
/// 全部结束后按目标顺序返回结果。单个渠道的失败、超时或 panic
/// 只体现在它自己的结果里，不影响其他渠道。
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(policy: DispatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    pub async fn dispatch(
        &self,
        event: Arc<Event>,
        targets: Vec<DispatchTarget>,
    ) -> Vec<DispatchOutcome> {
        let handles: Vec<_> = targets
            .into_iter()
            .map(|target| {
                let meta = (
                    target.rule.clone(),
                    target.channel.kind(),
                    target.channel.name().to_string(),
                );
                let handle = tokio::spawn(deliver_one(
                    self.policy.clone(),
                    Arc::clone(&event),
                    target,
                ));
                (meta, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for ((rule, channel_type, channel_name), handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => DispatchOutcome {
                    rule,
                    channel_type,
                    channel_name,
                    attempts: 1,
                    result: Err(DeliveryError::Aborted(e.to_string()).into()),
                },
            };

            log_outcome(&event, &outcome);
            outcomes.push(outcome);
        }

        outcomes
    }
}

async fn deliver_one(
    policy: DispatchPolicy,
    event: Arc<Event>,
    target: DispatchTarget,
) -> DispatchOutcome {
    let channel = target.channel;
    let mut outcome = DispatchOutcome {
        rule: target.rule,
        channel_type: channel.kind(),
        channel_name: channel.name().to_string(),
        attempts: 0,
        result: Ok(()),
    };

    let message = match channel.render(&event) {
        Ok(message) => message,
        Err(e) => {
            outcome.result = Err(e.into());
            return outcome;
        }
    };

    loop {
        outcome.attempts += 1;

        let result = match tokio::time::timeout(policy.timeout, channel.deliver(&message)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(policy.timeout)),
        };

        match result {
            Ok(()) => return outcome,
            Err(e) if e.is_retryable() && outcome.attempts <= policy.max_retries => {
                let backoff = retry_backoff(&policy, outcome.attempts);
                warn!(
                    rule = %outcome.rule,
                    channel_type = %outcome.channel_type,
                    channel_name = %outcome.channel_name,
                    attempt = outcome.attempts,
                    error = %e,
                    "Delivery failed, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                outcome.result = Err(e.into());
                return outcome;
            }
        }
    }
}

/// 第 n 次失败后的等待：`retry_backoff * 2^(n-1)`，溢出时取最大值
fn retry_backoff(policy: &DispatchPolicy, attempt: u32) -> Duration {
    let factor = 2u32.pow(attempt.saturating_sub(1).min(10));
    policy
        .retry_backoff
        .checked_mul(factor)
        .unwrap_or(Duration::MAX)
}

fn log_outcome(event: &Event, outcome: &DispatchOutcome) {
    match &outcome.result {
        Ok(()) => info!(
            source = %event.source(),
            event_type = %event.event_type(),
            rule = %outcome.rule,
            channel_type = %outcome.channel_type,
            channel_name = %outcome.channel_name,
            attempts = outcome.attempts,
            "Notification delivered"
        ),
        Err(e) => error!(
            source = %event.source(),
            event_type = %event.event_type(),
            rule = %outcome.rule,
            channel_type = %outcome.channel_type,
            channel_name = %outcome.channel_name,
            attempts = outcome.attempts,
            error = %e,
            "Notification failed"
        ),
    }
}

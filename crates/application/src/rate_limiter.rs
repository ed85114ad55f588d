//! 发送方滑动窗口限流
//!
//! 三类拒绝：频率超限、重复刷屏、长消息连发。窗口是滑动的而非
//! 固定分桶，每次检查都会清掉最宽窗口之外的历史记录以约束内存。
//!
//! `check` 与 `record` 分离：只有校验通过、限流放行且持久化成功
//! 的消息才调用 `record`，失败的发送不消耗限流配额。

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use domain::{Timestamp, UserId};
use time::Duration;
use tokio::sync::Mutex;

use crate::error::RateLimitError;

/// 限流策略。阈值全部来自配置，算法本身不内嵌具体数值。
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// 滚动窗口内允许的最大发送条数（N）
    pub max_messages: u32,
    /// 频率窗口（W1）
    pub window: Duration,
    /// 重复内容判定窗口（W2）
    pub duplicate_window: Duration,
    /// 超过该字符数即视为"长消息"
    pub long_message_len: usize,
    /// 长消息窗口内允许的最大条数（M）
    pub max_long_messages: u32,
    /// 长消息窗口（W3）
    pub long_window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_messages: 5,
            window: Duration::seconds(10),
            duplicate_window: Duration::seconds(30),
            long_message_len: 500,
            max_long_messages: 3,
            long_window: Duration::seconds(60),
        }
    }
}

impl RateLimitPolicy {
    fn widest_window(&self) -> Duration {
        self.window.max(self.duplicate_window).max(self.long_window)
    }
}

#[derive(Debug, Clone)]
struct SendRecord {
    at: Timestamp,
    /// 归一化正文指纹；无正文的消息（纯附件）不参与重复判定
    fingerprint: Option<u64>,
    long: bool,
}

#[derive(Debug, Default)]
struct SenderHistory {
    entries: VecDeque<SendRecord>,
}

impl SenderHistory {
    fn purge(&mut self, cutoff: Timestamp) {
        while let Some(front) = self.entries.front() {
            if front.at <= cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }
}

/// 每发送者的消息限流器，按订单会话各持一份。
pub struct MessageRateLimiter {
    policy: RateLimitPolicy,
    histories: Mutex<HashMap<UserId, SenderHistory>>,
}

impl MessageRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            histories: Mutex::new(HashMap::new()),
        }
    }

    /// 检查一次发送是否放行。不修改历史记录。
    pub async fn check(
        &self,
        sender_id: UserId,
        text: &str,
        now: Timestamp,
    ) -> Result<(), RateLimitError> {
        let fingerprint = normalize_fingerprint(text);
        let is_long = self.is_long(text);

        let mut histories = self.histories.lock().await;
        let history = histories.entry(sender_id).or_default();
        history.purge(now - self.policy.widest_window());

        // 频率窗口
        let window_start = now - self.policy.window;
        let in_window: Vec<&SendRecord> = history
            .entries
            .iter()
            .filter(|record| record.at > window_start)
            .collect();
        if in_window.len() >= self.policy.max_messages as usize {
            let oldest = in_window[0].at;
            return Err(RateLimitError::RateLimited {
                retry_after_secs: retry_after(oldest + self.policy.window, now),
            });
        }

        // 重复内容窗口
        if let Some(fingerprint) = fingerprint {
            let duplicate_start = now - self.policy.duplicate_window;
            if let Some(latest) = history
                .entries
                .iter()
                .filter(|record| record.at > duplicate_start)
                .filter(|record| record.fingerprint == Some(fingerprint))
                .last()
            {
                return Err(RateLimitError::DuplicateSpam {
                    retry_after_secs: retry_after(latest.at + self.policy.duplicate_window, now),
                });
            }
        }

        // 长消息窗口
        if is_long {
            let long_start = now - self.policy.long_window;
            let long_in_window: Vec<&SendRecord> = history
                .entries
                .iter()
                .filter(|record| record.long && record.at > long_start)
                .collect();
            if long_in_window.len() >= self.policy.max_long_messages as usize {
                let oldest = long_in_window[0].at;
                return Err(RateLimitError::LongMessageSpam {
                    retry_after_secs: retry_after(oldest + self.policy.long_window, now),
                });
            }
        }

        Ok(())
    }

    /// 登记一次成功的发送。仅在消息持久化成功后调用。
    pub async fn record(&self, sender_id: UserId, text: &str, now: Timestamp) {
        let record = SendRecord {
            at: now,
            fingerprint: normalize_fingerprint(text),
            long: self.is_long(text),
        };

        let mut histories = self.histories.lock().await;
        let history = histories.entry(sender_id).or_default();
        history.purge(now - self.policy.widest_window());
        history.entries.push_back(record);
    }

    /// 清掉所有发送者的过期历史，移除空记录。
    pub async fn cleanup(&self, now: Timestamp) {
        let cutoff = now - self.policy.widest_window();
        let mut histories = self.histories.lock().await;
        histories.retain(|_, history| {
            history.purge(cutoff);
            !history.entries.is_empty()
        });
    }

    /// 当前持有历史记录的发送者数量。
    pub async fn tracked_senders(&self) -> usize {
        self.histories.lock().await.len()
    }

    fn is_long(&self, text: &str) -> bool {
        text.trim().chars().count() > self.policy.long_message_len
    }
}

/// 去首尾空白并小写化后的指纹，近似相同的正文会命中同一个值。
fn normalize_fingerprint(text: &str) -> Option<u64> {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    Some(hasher.finish())
}

/// 距离越界记录滑出窗口还差的整秒数，向上取整且至少为 1。
fn retry_after(deadline: Timestamp, now: Timestamp) -> u64 {
    let remaining = deadline - now;
    if remaining.is_positive() {
        let secs = remaining.whole_seconds();
        let rounded = if remaining.subsec_nanoseconds() > 0 {
            secs + 1
        } else {
            secs
        };
        (rounded.max(1)) as u64
    } else {
        1
    }
}

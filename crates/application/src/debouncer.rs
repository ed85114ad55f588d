//! 在线通知防抖
//!
//! 抑制重连风暴（弱网、页面刷新）带来的重复 "X 加入/离开" 噪音，
//! 同时保留真实的在线变化。缓存按观察连接各持一份，是连接会话
//! 状态里的一个普通字段，不做任何跨连接共享；同一订单的两个观察
//! 者可能对同一事件作出不同的展示决定，这是刻意保留的行为。
//!
//! 加入事件同步决策；离开事件先挂起一个重连窗口，由周期性的
//! `sweep` 在确认没有重连之后才放出通知。`sweep` 同时负责清掉
//! 过期缓存项（确定性的定时触发，而非概率触发）。

use std::collections::HashMap;

use domain::{OrderId, PresenceEventKind, SystemNotification, Timestamp, UserId};
use time::Duration;

/// 防抖窗口配置。
#[derive(Debug, Clone)]
pub struct DebouncePolicy {
    /// 同一身份重复加入的抑制窗口
    pub join_suppress: Duration,
    /// 断线重连窗口：离开后在此窗口内回来视为同一会话延续
    pub reconnect: Duration,
    /// 缓存项的过期时间
    pub expiry: Duration,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self {
            join_suppress: Duration::seconds(30),
            reconnect: Duration::seconds(15),
            expiry: Duration::seconds(300),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    kind: PresenceEventKind,
    at: Timestamp,
    /// 尚未放出的离开通知，等待重连窗口结束
    pending_leave: Option<SystemNotification>,
}

/// 单个观察连接的通知防抖器。
pub struct NotificationDebouncer {
    order_id: OrderId,
    policy: DebouncePolicy,
    entries: HashMap<UserId, CacheEntry>,
}

impl NotificationDebouncer {
    pub fn new(order_id: OrderId, policy: DebouncePolicy) -> Self {
        Self {
            order_id,
            policy,
            entries: HashMap::new(),
        }
    }

    /// 处理一条在线变更。返回值是应当立即展示的通知。
    pub fn observe(
        &mut self,
        kind: PresenceEventKind,
        user_id: UserId,
        display_name: &str,
        now: Timestamp,
    ) -> Option<SystemNotification> {
        match kind {
            PresenceEventKind::Joined => self.observe_join(user_id, display_name, now),
            PresenceEventKind::Left => self.observe_leave(user_id, display_name, now),
        }
    }

    fn observe_join(
        &mut self,
        user_id: UserId,
        display_name: &str,
        now: Timestamp,
    ) -> Option<SystemNotification> {
        match self.entries.get(&user_id) {
            Some(entry)
                if entry.kind == PresenceEventKind::Joined
                    && now - entry.at < self.policy.join_suppress =>
            {
                // 抑制窗口内的重复加入
                None
            }
            Some(entry)
                if entry.kind == PresenceEventKind::Left
                    && now - entry.at < self.policy.reconnect =>
            {
                // 同一会话恢复：撤销挂起的离开通知，也不展示加入
                self.entries.insert(
                    user_id,
                    CacheEntry {
                        kind: PresenceEventKind::Joined,
                        at: now,
                        pending_leave: None,
                    },
                );
                None
            }
            _ => {
                self.entries.insert(
                    user_id,
                    CacheEntry {
                        kind: PresenceEventKind::Joined,
                        at: now,
                        pending_leave: None,
                    },
                );
                Some(SystemNotification::joined(
                    self.order_id,
                    user_id,
                    display_name,
                    now,
                ))
            }
        }
    }

    fn observe_leave(
        &mut self,
        user_id: UserId,
        display_name: &str,
        now: Timestamp,
    ) -> Option<SystemNotification> {
        if let Some(entry) = self.entries.get(&user_id) {
            if entry.kind == PresenceEventKind::Left && now - entry.at < self.policy.reconnect {
                // 快速的重复离开不再入队
                return None;
            }
        }
        self.entries.insert(
            user_id,
            CacheEntry {
                kind: PresenceEventKind::Left,
                at: now,
                pending_leave: Some(SystemNotification::left(
                    self.order_id,
                    user_id,
                    display_name,
                    now,
                )),
            },
        );
        None
    }

    /// 定时清扫：放出重连窗口已过、仍未被重连撤销的离开通知，
    /// 并清掉过期的缓存项。
    pub fn sweep(&mut self, now: Timestamp) -> Vec<SystemNotification> {
        let mut matured = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.pending_leave.is_some() && now - entry.at >= self.policy.reconnect {
                if let Some(notification) = entry.pending_leave.take() {
                    matured.push(notification);
                }
            }
        }
        self.entries
            .retain(|_, entry| now - entry.at < self.policy.expiry);
        matured
    }

    /// 当前缓存的身份数量（内存有界性检查用）。
    pub fn cached_entries(&self) -> usize {
        self.entries.len()
    }
}

//! 在线名册与注册表抽象
//!
//! `RoomRoster` 是纯逻辑：合并同一用户的多端连接，并在名册实际
//! 变化（首个连接加入、最后一个连接关闭）时产生增量。集中式的
//! 注册表实现由基础设施层提供。

use async_trait::async_trait;
use domain::{ConnectionId, ConnectionMeta, OrderId, PresenceEntry, RosterDiff, UserId};
use std::collections::HashMap;

use crate::error::PresenceError;

/// 单个订单会话的在线名册。
#[derive(Default)]
pub struct RoomRoster {
    entries: HashMap<UserId, PresenceEntry>,
}

impl RoomRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条连接加入。仅当这是该身份的第一个连接时返回增量。
    pub fn join(
        &mut self,
        user_id: UserId,
        display_name: &str,
        meta: ConnectionMeta,
    ) -> Option<RosterDiff> {
        match self.entries.get_mut(&user_id) {
            Some(entry) => {
                if !entry
                    .connections
                    .iter()
                    .any(|existing| existing.connection_id == meta.connection_id)
                {
                    entry.connections.push(meta);
                }
                None
            }
            None => {
                let entry = PresenceEntry::new(user_id, display_name, meta);
                self.entries.insert(user_id, entry.clone());
                Some(RosterDiff {
                    joined: vec![entry],
                    left: Vec::new(),
                })
            }
        }
    }

    /// 记录一条连接关闭。仅当这是该身份的最后一个连接时返回增量。
    pub fn leave(&mut self, user_id: UserId, connection_id: ConnectionId) -> Option<RosterDiff> {
        let entry = self.entries.get_mut(&user_id)?;
        entry
            .connections
            .retain(|meta| meta.connection_id != connection_id);
        if entry.connections.is_empty() {
            let entry = self.entries.remove(&user_id)?;
            return Some(RosterDiff {
                joined: Vec::new(),
                left: vec![entry],
            });
        }
        None
    }

    /// 合并后的名册，按首个连接加入时间排序。
    pub fn roster(&self) -> Vec<PresenceEntry> {
        let mut entries: Vec<PresenceEntry> = self.entries.values().cloned().collect();
        entries.sort_by_key(|entry| {
            entry
                .connections
                .first()
                .map(|meta| meta.joined_at)
                .unwrap_or(domain::Timestamp::UNIX_EPOCH)
        });
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 集中式在线注册表。注册失败只降级会话（该用户不对其他成员
/// 显示在线），不中断连接。
#[async_trait]
pub trait PresenceTracker: Send + Sync {
    async fn track(
        &self,
        order_id: OrderId,
        user_id: UserId,
        display_name: &str,
        connection_id: ConnectionId,
    ) -> Result<(), PresenceError>;

    async fn untrack(
        &self,
        order_id: OrderId,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<(), PresenceError>;

    async fn roster(&self, order_id: OrderId) -> Result<Vec<PresenceEntry>, PresenceError>;
}

#[cfg(test)]
mod tests {
    use domain::Timestamp;
    use time::Duration;
    use uuid::Uuid;

    use super::*;

    fn meta(secs: i64) -> ConnectionMeta {
        ConnectionMeta {
            connection_id: ConnectionId::new(Uuid::new_v4()),
            joined_at: Timestamp::UNIX_EPOCH + Duration::seconds(secs),
        }
    }

    #[test]
    fn first_connection_joins_last_connection_leaves() {
        let mut roster = RoomRoster::new();
        let ada = UserId::new(Uuid::new_v4());
        let phone = meta(0);
        let laptop = meta(5);

        let diff = roster.join(ada, "Ada", phone.clone()).unwrap();
        assert_eq!(diff.joined[0].user_id, ada);

        // 第二台设备加入：名册无变化
        assert!(roster.join(ada, "Ada", laptop.clone()).is_none());
        assert_eq!(roster.roster().len(), 1);
        assert_eq!(roster.roster()[0].connections.len(), 2);

        // 先关掉一台：仍然在线
        assert!(roster.leave(ada, phone.connection_id).is_none());

        // 最后一台关闭：产生离开增量
        let diff = roster.leave(ada, laptop.connection_id).unwrap();
        assert_eq!(diff.left[0].user_id, ada);
        assert!(roster.is_empty());
    }

    #[test]
    fn duplicate_join_of_same_connection_is_ignored() {
        let mut roster = RoomRoster::new();
        let ada = UserId::new(Uuid::new_v4());
        let phone = meta(0);

        roster.join(ada, "Ada", phone.clone());
        assert!(roster.join(ada, "Ada", phone.clone()).is_none());
        assert_eq!(roster.roster()[0].connections.len(), 1);
    }

    #[test]
    fn leave_of_unknown_user_is_a_no_op() {
        let mut roster = RoomRoster::new();
        assert!(roster
            .leave(UserId::new(Uuid::new_v4()), ConnectionId::new(Uuid::new_v4()))
            .is_none());
    }

    #[test]
    fn roster_is_ordered_by_first_join_time() {
        let mut roster = RoomRoster::new();
        let ada = UserId::new(Uuid::new_v4());
        let bob = UserId::new(Uuid::new_v4());

        roster.join(bob, "Bob", meta(10));
        roster.join(ada, "Ada", meta(3));

        let names: Vec<String> = roster
            .roster()
            .into_iter()
            .map(|entry| entry.display_name)
            .collect();
        assert_eq!(names, vec!["Ada".to_owned(), "Bob".to_owned()]);
    }
}

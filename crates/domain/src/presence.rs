use serde::{Deserialize, Serialize};

use crate::value_objects::{ConnectionId, Timestamp, UserId};

/// 单个连接的元数据。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMeta {
    pub connection_id: ConnectionId,
    pub joined_at: Timestamp,
}

/// 名册中的一个在线身份。
///
/// 同一用户的多端连接合并为一条记录，`connections` 按加入顺序排列。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub connections: Vec<ConnectionMeta>,
}

impl PresenceEntry {
    pub fn new(user_id: UserId, display_name: impl Into<String>, meta: ConnectionMeta) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            connections: vec![meta],
        }
    }
}

/// 一次名册变更产生的增量。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterDiff {
    pub joined: Vec<PresenceEntry>,
    pub left: Vec<PresenceEntry>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

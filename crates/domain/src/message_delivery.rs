use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageStatus};
use crate::value_objects::UserId;

/// 单条消息的回执记录。
///
/// 两个身份集合只做并集插入，从不移除；重复标记与乱序标记
/// 收敛到同一状态。发送者本人不计入任何集合。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    sender_id: UserId,
    delivered_to: HashSet<UserId>,
    read_by: HashSet<UserId>,
}

impl DeliveryRecord {
    pub fn new(sender_id: UserId) -> Self {
        Self {
            sender_id,
            delivered_to: HashSet::new(),
            read_by: HashSet::new(),
        }
    }

    /// 标记已送达。返回集合是否真的发生了变化。
    pub fn mark_delivered(&mut self, recipient: UserId) -> bool {
        if recipient == self.sender_id {
            return false;
        }
        self.delivered_to.insert(recipient)
    }

    /// 标记已读。返回集合是否真的发生了变化。
    pub fn mark_read(&mut self, recipient: UserId) -> bool {
        if recipient == self.sender_id {
            return false;
        }
        self.read_by.insert(recipient)
    }

    pub fn delivered_to(&self) -> &HashSet<UserId> {
        &self.delivered_to
    }

    pub fn read_by(&self) -> &HashSet<UserId> {
        &self.read_by
    }

    /// 推导展示状态：read 优先于 delivered，都为空则是 sent。
    pub fn status(&self) -> MessageStatus {
        if !self.read_by.is_empty() {
            MessageStatus::Read
        } else if !self.delivered_to.is_empty() {
            MessageStatus::Delivered
        } else {
            MessageStatus::Sent
        }
    }

    /// 把回执集合写回消息视图。
    pub fn apply_to(&self, message: &mut Message) {
        message.delivered_to = self.delivered_to.clone();
        message.read_by = self.read_by.clone();
    }
}

//! 回执状态追踪
//!
//! 每条消息维护送达/已读两个只增身份集合，标记操作幂等且可交换。
//! 追踪器由每订单的协调器单独持有。

use std::collections::HashMap;

use domain::{DeliveryRecord, Message, MessageId, MessageStatus};

#[derive(Default)]
pub struct DeliveryStatusTracker {
    records: HashMap<MessageId, DeliveryRecord>,
}

impl DeliveryStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新消息登记空回执集合。
    pub fn track(&mut self, message: &Message) {
        self.records
            .entry(message.id)
            .or_insert_with(|| DeliveryRecord::new(message.sender_id));
    }

    /// 标记已送达。集合真的变化时返回推导后的新状态。
    pub fn mark_delivered(&mut self, message: &Message, recipient: domain::UserId) -> Option<MessageStatus> {
        let record = self
            .records
            .entry(message.id)
            .or_insert_with(|| DeliveryRecord::new(message.sender_id));
        record.mark_delivered(recipient).then(|| record.status())
    }

    /// 标记已读。集合真的变化时返回推导后的新状态。
    pub fn mark_read(&mut self, message: &Message, recipient: domain::UserId) -> Option<MessageStatus> {
        let record = self
            .records
            .entry(message.id)
            .or_insert_with(|| DeliveryRecord::new(message.sender_id));
        record.mark_read(recipient).then(|| record.status())
    }

    pub fn record(&self, message_id: MessageId) -> Option<&DeliveryRecord> {
        self.records.get(&message_id)
    }

    /// 把回执集合写回消息视图（历史查询等场景）。
    pub fn decorate(&self, message: &mut Message) {
        if let Some(record) = self.records.get(&message.id) {
            record.apply_to(message);
        }
    }
}

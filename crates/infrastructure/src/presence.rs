//! 集中式在线注册表（进程内实现）
//!
//! 名册变化（某身份的第一个连接加入、最后一个连接关闭）时在
//! 对应订单主题上发布 `PresenceChanged` 增量。注册失败对调用方
//! 是非致命的：会话继续，只是该用户不对其他成员显示在线。

use std::collections::HashMap;
use std::sync::Arc;

use application::{order_topic, Clock, PresenceError, PresenceTracker, RoomRoster, TopicBus};
use async_trait::async_trait;
use domain::{ConnectionId, ConnectionMeta, OrderId, PresenceEntry, SessionEvent, UserId};
use tokio::sync::Mutex;

pub struct InMemoryPresenceTracker {
    bus: Arc<dyn TopicBus>,
    clock: Arc<dyn Clock>,
    rooms: Mutex<HashMap<OrderId, RoomRoster>>,
}

impl InMemoryPresenceTracker {
    pub fn new(bus: Arc<dyn TopicBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            bus,
            clock,
            rooms: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PresenceTracker for InMemoryPresenceTracker {
    async fn track(
        &self,
        order_id: OrderId,
        user_id: UserId,
        display_name: &str,
        connection_id: ConnectionId,
    ) -> Result<(), PresenceError> {
        let meta = ConnectionMeta {
            connection_id,
            joined_at: self.clock.now(),
        };
        let diff = {
            let mut rooms = self.rooms.lock().await;
            rooms
                .entry(order_id)
                .or_default()
                .join(user_id, display_name, meta)
        };

        if let Some(diff) = diff {
            self.bus
                .publish(
                    &order_topic(order_id),
                    SessionEvent::PresenceChanged { order_id, diff },
                )
                .await
                .map_err(|err| PresenceError::unavailable(err.to_string()))?;
        }

        tracing::info!(
            order_id = %order_id,
            user_id = %user_id,
            connection_id = %connection_id,
            "连接加入会话"
        );
        Ok(())
    }

    async fn untrack(
        &self,
        order_id: OrderId,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<(), PresenceError> {
        let diff = {
            let mut rooms = self.rooms.lock().await;
            let Some(roster) = rooms.get_mut(&order_id) else {
                return Ok(());
            };
            let diff = roster.leave(user_id, connection_id);
            if roster.is_empty() {
                rooms.remove(&order_id);
            }
            diff
        };

        if let Some(diff) = diff {
            self.bus
                .publish(
                    &order_topic(order_id),
                    SessionEvent::PresenceChanged { order_id, diff },
                )
                .await
                .map_err(|err| PresenceError::unavailable(err.to_string()))?;
        }

        tracing::info!(
            order_id = %order_id,
            user_id = %user_id,
            connection_id = %connection_id,
            "连接离开会话"
        );
        Ok(())
    }

    async fn roster(&self, order_id: OrderId) -> Result<Vec<PresenceEntry>, PresenceError> {
        let rooms = self.rooms.lock().await;
        Ok(rooms
            .get(&order_id)
            .map(RoomRoster::roster)
            .unwrap_or_default())
    }
}

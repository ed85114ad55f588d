//! 进程内主题总线
//!
//! 每个主题一条 `tokio::sync::broadcast` 通道。同一发布者在一个
//! 主题上的事件按发布顺序送达每个订阅者；跨发布者不保证全序。

use std::collections::HashMap;

use application::{BroadcastError, TopicBus};
use async_trait::async_trait;
use domain::SessionEvent;
use tokio::sync::{broadcast, RwLock};

pub struct LocalTopicBus {
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<SessionEvent>>>,
}

impl LocalTopicBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// 订阅一个主题，必要时创建通道。
    pub async fn subscribe(&self, topic: &str) -> TopicStream {
        let mut topics = self.topics.write().await;
        let sender = topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        TopicStream {
            receiver: sender.subscribe(),
        }
    }
}

#[async_trait]
impl TopicBus for LocalTopicBus {
    async fn publish(&self, topic: &str, event: SessionEvent) -> Result<(), BroadcastError> {
        let topics = self.topics.read().await;
        let Some(sender) = topics.get(topic) else {
            // 无人订阅的主题直接丢弃
            return Ok(());
        };
        if sender.receiver_count() == 0 {
            return Ok(());
        }
        sender
            .send(event)
            .map_err(|err| BroadcastError::failed(err.to_string()))?;
        Ok(())
    }
}

/// 一个主题上的事件流。
pub struct TopicStream {
    receiver: broadcast::Receiver<SessionEvent>,
}

impl TopicStream {
    /// 下一条事件；通道关闭时返回 `None`。
    ///
    /// 消费过慢而掉队的订阅者跳到最新位置继续，缺口由分页历史
    /// 补齐（客户端把消息列表当作按接收顺序追加处理）。
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "订阅者掉队，跳过积压事件");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞取一条事件；当前没有事件时返回 `Ok(None)`。
    pub fn try_recv(&mut self) -> Result<Option<SessionEvent>, BroadcastError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty)
            | Err(broadcast::error::TryRecvError::Closed) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "订阅者掉队，跳过积压事件");
                Ok(None)
            }
        }
    }
}

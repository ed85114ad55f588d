use application::{mentions_topic, notifications_topic, order_topic, NotificationDebouncer};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ConnectionId, OrderId, PresenceEventKind, SessionEvent, Timestamp, UserId};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;

/// WebSocket 连接工作者
///
/// 每个客户端连接一个任务（§并发模型）：
/// - 订阅订单主题和本用户的两个个人通道
/// - 在主循环前注册在线、结束后注销
/// - 持有本连接自己的通知防抖缓存，并按固定间隔清扫
/// - 过滤自回声（针对自己的系统通知、自己的名册增量不进防抖）
pub struct WebSocketConnection {
    state: AppState,
    order_id: OrderId,
    user_id: UserId,
    display_name: String,
    connection_id: ConnectionId,
}

/// WebSocket 写操作命令（接收任务到发送任务的回传通道）
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}

impl WebSocketConnection {
    pub fn new(state: AppState, order_id: OrderId, user_id: UserId, display_name: String) -> Self {
        Self {
            state,
            order_id,
            user_id,
            display_name,
            connection_id: ConnectionId::new(Uuid::new_v4()),
        }
    }

    /// 运行连接的主循环，直到任一方向断开。
    pub async fn run(self, socket: WebSocket) {
        // 先订阅再注册在线，自己加入之后的事件一条不漏
        let mut order_stream = self.state.bus.subscribe(&order_topic(self.order_id)).await;
        let mut personal_stream = self
            .state
            .bus
            .subscribe(&notifications_topic(self.user_id))
            .await;
        let mut mention_stream = self
            .state
            .bus
            .subscribe(&mentions_topic(self.user_id))
            .await;

        // 在线注册失败只降级：该用户不对其他成员显示在线，会话继续
        if let Err(err) = self
            .state
            .presence
            .track(
                self.order_id,
                self.user_id,
                &self.display_name,
                self.connection_id,
            )
            .await
        {
            tracing::warn!(error = %err, user_id = %self.user_id, "在线注册失败，会话降级继续");
        }
        tracing::info!(
            order_id = %self.order_id,
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            "WebSocket 连接已建立"
        );

        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let send_task = {
            let clock = self.state.clock.clone();
            let debounce_policy = self.state.debounce.clone();
            let sweep_interval = self.state.sweep_interval;
            let order_id = self.order_id;
            let user_id = self.user_id;

            tokio::spawn(async move {
                let mut debouncer = NotificationDebouncer::new(order_id, debounce_policy);
                let mut sweep = tokio::time::interval(sweep_interval);

                'outer: loop {
                    tokio::select! {
                        maybe_cmd = cmd_rx.recv() => {
                            match maybe_cmd {
                                Some(WsCommand::SendPong(data)) => {
                                    if sender.send(WsMessage::Pong(data.into())).await.is_err() {
                                        break 'outer;
                                    }
                                }
                                None => break 'outer,
                            }
                        }
                        maybe_event = order_stream.recv() => {
                            let Some(event) = maybe_event else { break 'outer };
                            for frame in render_order_event(event, user_id, &mut debouncer, clock.now()) {
                                if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                                    break 'outer;
                                }
                            }
                        }
                        maybe_event = personal_stream.recv() => {
                            let Some(event) = maybe_event else { break 'outer };
                            if let Some(frame) = serialize_event(&event) {
                                if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                                    break 'outer;
                                }
                            }
                        }
                        maybe_event = mention_stream.recv() => {
                            let Some(event) = maybe_event else { break 'outer };
                            if let Some(frame) = serialize_event(&event) {
                                if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                                    break 'outer;
                                }
                            }
                        }
                        _ = sweep.tick() => {
                            // 确定性的定时清扫：放出成熟的离开通知，顺带驱逐过期缓存
                            for notification in debouncer.sweep(clock.now()) {
                                let event = SessionEvent::SystemNotification { notification };
                                if let Some(frame) = serialize_event(&event) {
                                    if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                                        break 'outer;
                                    }
                                }
                            }
                        }
                    }
                }
                tracing::debug!("WebSocket 发送任务结束");
            })
        };

        // 接收任务：心跳与关闭；消息发送走 HTTP 接口
        let recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                match message {
                    WsMessage::Close(_) => break,
                    WsMessage::Ping(data) => {
                        if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Pong(_) => {}
                    WsMessage::Text(_) | WsMessage::Binary(_) => {
                        tracing::debug!("收到客户端消息");
                    }
                }
            }
            tracing::debug!("WebSocket 接收任务结束");
        });

        // 任一方向结束即拆除另一侧
        let mut send_task = send_task;
        let mut recv_task = recv_task;
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        if let Err(err) = self
            .state
            .presence
            .untrack(self.order_id, self.user_id, self.connection_id)
            .await
        {
            tracing::warn!(error = %err, user_id = %self.user_id, "在线状态清理失败");
        }
        tracing::info!(
            order_id = %self.order_id,
            user_id = %self.user_id,
            "WebSocket 连接已断开，在线状态已清理"
        );
    }
}

/// 把订单主题上的一条事件翻译成要推给该客户端的帧序列。
///
/// 名册增量原样转发（客户端维护在线列表），同时喂给本连接的
/// 防抖器产生系统通知；涉及自己的增量不进防抖（自己不需要看到
/// "我加入了"）。针对自己的系统通知同样被抑制。
fn render_order_event(
    event: SessionEvent,
    self_id: UserId,
    debouncer: &mut NotificationDebouncer,
    now: Timestamp,
) -> Vec<String> {
    let mut frames = Vec::new();
    match event {
        SessionEvent::PresenceChanged { order_id, diff } => {
            for entry in &diff.joined {
                if entry.user_id == self_id {
                    continue;
                }
                if let Some(notification) =
                    debouncer.observe(PresenceEventKind::Joined, entry.user_id, &entry.display_name, now)
                {
                    if let Some(frame) =
                        serialize_event(&SessionEvent::SystemNotification { notification })
                    {
                        frames.push(frame);
                    }
                }
            }
            for entry in &diff.left {
                if entry.user_id == self_id {
                    continue;
                }
                // 离开先挂起，由清扫在重连窗口后放出
                debouncer.observe(PresenceEventKind::Left, entry.user_id, &entry.display_name, now);
            }
            if let Some(frame) = serialize_event(&SessionEvent::PresenceChanged { order_id, diff }) {
                frames.push(frame);
            }
        }
        SessionEvent::SystemNotification { notification } => {
            if notification.target_id != self_id {
                if let Some(frame) = serialize_event(&SessionEvent::SystemNotification { notification }) {
                    frames.push(frame);
                }
            }
        }
        other => {
            if let Some(frame) = serialize_event(&other) {
                frames.push(frame);
            }
        }
    }
    frames
}

fn serialize_event(event: &SessionEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(frame) => Some(frame),
        Err(err) => {
            tracing::warn!(error = %err, "事件序列化失败");
            None
        }
    }
}

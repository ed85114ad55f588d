//! 扁平回复索引
//!
//! 基于一次会话消息快照的线程查询。线程模型是扁平的：回复永远
//! 指向根消息（`reply_to` 为空的消息），回复之间不再嵌套。

use std::collections::HashMap;

use domain::{Message, MessageId};
use serde::Serialize;

/// "回复某条消息"场景下的预览截断长度。
const PREVIEW_LEN: usize = 80;

/// 渲染"正在回复"上下文用的摘要。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyPreview {
    pub id: MessageId,
    pub text: String,
    pub sender_name: String,
}

/// 会话消息快照上的线程索引。
pub struct ThreadIndex<'a> {
    by_id: HashMap<MessageId, &'a Message>,
    replies: HashMap<MessageId, Vec<&'a Message>>,
}

impl<'a> ThreadIndex<'a> {
    /// 快照按接收顺序传入；系统消息不参与回复计数。
    pub fn new(messages: &'a [Message]) -> Self {
        let mut by_id = HashMap::with_capacity(messages.len());
        let mut replies: HashMap<MessageId, Vec<&'a Message>> = HashMap::new();

        for message in messages {
            by_id.insert(message.id, message);
            if message.is_system() {
                continue;
            }
            if let Some(root_id) = message.reply_to {
                replies.entry(root_id).or_default().push(message);
            }
        }
        for thread in replies.values_mut() {
            thread.sort_by_key(|message| message.created_at);
        }

        Self { by_id, replies }
    }

    /// 回复数。没有任何回复时返回 `None` 而非 `Some(0)`，
    /// 调用方据此区分"是线程根"与"不是线程"。
    pub fn reply_count(&self, message_id: MessageId) -> Option<usize> {
        self.replies.get(&message_id).map(Vec::len)
    }

    /// 根消息在前、回复按创建顺序排列的完整线程。
    /// 传入的不是根消息（或快照里没有）时返回 `None`。
    pub fn thread_of(&self, root_id: MessageId) -> Option<Vec<&'a Message>> {
        let root = *self.by_id.get(&root_id)?;
        if root.reply_to.is_some() {
            return None;
        }
        let mut thread = vec![root];
        if let Some(replies) = self.replies.get(&root_id) {
            thread.extend(replies.iter().copied());
        }
        Some(thread)
    }

    /// "正在回复"摘要：截断正文并标注省略。
    pub fn preview_of(&self, message_id: MessageId) -> Option<ReplyPreview> {
        let message = *self.by_id.get(&message_id)?;
        let text = message
            .body
            .clone()
            .unwrap_or_else(|| attachment_label(message).to_owned());
        Some(ReplyPreview {
            id: message.id,
            text: truncate(&text, PREVIEW_LEN),
            sender_name: message.sender_name.clone(),
        })
    }
}

fn attachment_label(message: &Message) -> &'static str {
    match &message.attachment {
        Some(domain::Attachment::Image { .. }) => "[image]",
        Some(domain::Attachment::Document { .. }) => "[document]",
        Some(domain::Attachment::Audio { .. }) => "[audio]",
        None => "",
    }
}

/// 按字符（而非字节）截断，超出时追加省略号。
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}

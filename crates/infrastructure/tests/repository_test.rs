//! 内存消息仓库：写入、分页与回复扁平化。

use application::{MessageRepository, NewMessageParams};
use domain::{MessageId, OrderId, RepositoryError, Timestamp, UserId};
use infrastructure::InMemoryMessageRepository;
use time::Duration;
use uuid::Uuid;

fn params(order_id: OrderId, body: &str, reply_to: Option<MessageId>, secs: i64) -> NewMessageParams {
    NewMessageParams {
        order_id,
        sender_id: UserId::new(Uuid::new_v4()),
        sender_name: "alice".into(),
        body: Some(body.to_owned()),
        attachment: None,
        reply_to,
        created_at: Timestamp::UNIX_EPOCH + Duration::seconds(secs),
    }
}

#[tokio::test]
async fn created_messages_are_found_in_receipt_order() {
    let repo = InMemoryMessageRepository::new();
    let order_id = OrderId::new(Uuid::new_v4());

    let first = repo.create_message(params(order_id, "one", None, 0)).await.unwrap();
    let second = repo.create_message(params(order_id, "two", None, 1)).await.unwrap();

    assert_eq!(
        repo.find(first.id).await.unwrap().unwrap().body.as_deref(),
        Some("one")
    );

    let all = repo.list_order(order_id).await.unwrap();
    assert_eq!(
        all.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );
}

#[tokio::test]
async fn keyset_pagination_walks_backwards() {
    let repo = InMemoryMessageRepository::new();
    let order_id = OrderId::new(Uuid::new_v4());

    let mut ids = Vec::new();
    for i in 0..5 {
        let message = repo
            .create_message(params(order_id, &format!("msg {i}"), None, i))
            .await
            .unwrap();
        ids.push(message.id);
    }

    let newest = repo.list_before(order_id, None, 2).await.unwrap();
    assert_eq!(newest.iter().map(|m| m.id).collect::<Vec<_>>(), ids[3..]);

    let older = repo.list_before(order_id, Some(ids[3]), 2).await.unwrap();
    assert_eq!(older.iter().map(|m| m.id).collect::<Vec<_>>(), ids[1..3]);

    let oldest = repo.list_before(order_id, Some(ids[1]), 2).await.unwrap();
    assert_eq!(oldest.iter().map(|m| m.id).collect::<Vec<_>>(), ids[..1]);
}

#[tokio::test]
async fn reply_to_a_reply_is_flattened_to_the_root() {
    let repo = InMemoryMessageRepository::new();
    let order_id = OrderId::new(Uuid::new_v4());

    let root = repo.create_message(params(order_id, "root", None, 0)).await.unwrap();
    let reply = repo
        .create_message(params(order_id, "reply", Some(root.id), 1))
        .await
        .unwrap();
    assert_eq!(reply.reply_to, Some(root.id));

    // 指向回复的回复被折叠到根
    let nested = repo
        .create_message(params(order_id, "nested", Some(reply.id), 2))
        .await
        .unwrap();
    assert_eq!(nested.reply_to, Some(root.id));
}

#[tokio::test]
async fn reply_target_must_exist_in_the_same_conversation() {
    let repo = InMemoryMessageRepository::new();
    let order_id = OrderId::new(Uuid::new_v4());

    let missing = repo
        .create_message(params(order_id, "reply", Some(MessageId::new(Uuid::new_v4())), 0))
        .await;
    assert!(matches!(missing, Err(RepositoryError::Rejected { .. })));

    let other_order = OrderId::new(Uuid::new_v4());
    let foreign_root = repo
        .create_message(params(other_order, "elsewhere", None, 0))
        .await
        .unwrap();
    let cross = repo
        .create_message(params(order_id, "reply", Some(foreign_root.id), 1))
        .await;
    assert!(matches!(cross, Err(RepositoryError::Rejected { .. })));
}

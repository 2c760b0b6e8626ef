// tests/integration/pubsub_test.rs

//! Integration tests for Pub/Sub delivery on a shared connection

use super::test_helpers::*;
use bytes::Bytes;
use futures::StreamExt;
use spineldb_client::core::pubsub::Subscription;
use spineldb_client::{Command, RespFrame, SpinelClient};
use std::time::Duration;

async fn next_message(sub: &mut Subscription) -> spineldb_client::core::protocol::PushMessage {
    tokio::time::timeout(STEP_TIMEOUT, sub.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("subscription ended")
}

/// Subscribes through the client while playing the server's confirmation.
async fn subscribe(ctx: &mut TestContext, channels: &[&str]) -> Subscription {
    let client: SpinelClient = ctx.client.clone();
    let names: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
    let pending = tokio::spawn(async move { client.subscribe(names).await });

    let mut expected = vec!["SUBSCRIBE"];
    expected.extend_from_slice(channels);
    ctx.conn.expect(&expected).await;
    ctx.conn.confirm("subscribe", channels, 0).await;
    pending.await.unwrap().unwrap()
}

// ===== Delivery Tests =====

#[tokio::test]
async fn test_subscribe_and_receive_messages() {
    let mut ctx = TestContext::new().await;
    let mut sub = subscribe(&mut ctx, &["news"]).await;

    ctx.conn.push_message("news", "hello").await;
    ctx.conn.push_message("news", "world").await;

    let first = next_message(&mut sub).await;
    assert_eq!(first.channel, Bytes::from("news"));
    assert_eq!(first.payload, Bytes::from("hello"));
    assert_eq!(first.pattern, None);
    assert_eq!(next_message(&mut sub).await.payload, Bytes::from("world"));
}

#[tokio::test]
async fn test_subscription_is_a_stream() {
    let mut ctx = TestContext::new().await;
    let mut sub = subscribe(&mut ctx, &["news"]).await;

    ctx.conn.push_message("news", "streamed").await;
    let message = tokio::time::timeout(STEP_TIMEOUT, sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.payload, Bytes::from("streamed"));
}

#[tokio::test]
async fn test_multi_channel_subscribe_waits_for_every_confirmation() {
    let mut ctx = TestContext::new().await;
    let mut sub = subscribe(&mut ctx, &["a", "b", "c"]).await;

    // A reply after the confirmations belongs to the next command.
    let ping = ctx.client.send::<String>(Command::new("PING"));
    ctx.conn.expect(&["PING"]).await;
    ctx.conn.send(RespFrame::SimpleString("PONG".into())).await;
    assert_eq!(ping.await.unwrap(), "PONG");

    ctx.conn.push_message("c", "third").await;
    assert_eq!(next_message(&mut sub).await.channel, Bytes::from("c"));
}

#[tokio::test]
async fn test_push_messages_interleaved_with_replies() {
    let mut ctx = TestContext::new().await;
    let mut sub = subscribe(&mut ctx, &["news"]).await;

    let first = ctx.client.send::<String>(Command::new("PING"));
    let second = ctx.client.send::<String>(Command::new("ECHO").arg("two"));
    ctx.conn.expect(&["PING"]).await;
    ctx.conn.expect(&["ECHO", "two"]).await;

    ctx.conn.push_message("news", "before").await;
    ctx.conn.send(RespFrame::SimpleString("PONG".into())).await;
    ctx.conn.push_message("news", "between").await;
    ctx.conn.bulk("two").await;

    assert_eq!(first.await.unwrap(), "PONG");
    assert_eq!(second.await.unwrap(), "two");
    assert_eq!(next_message(&mut sub).await.payload, Bytes::from("before"));
    assert_eq!(next_message(&mut sub).await.payload, Bytes::from("between"));
}

#[tokio::test]
async fn test_pattern_subscription_receives_pmessage() {
    let mut ctx = TestContext::new().await;

    let client = ctx.client.clone();
    let pending = tokio::spawn(async move { client.psubscribe(["news.*"]).await });
    ctx.conn.expect(&["PSUBSCRIBE", "news.*"]).await;
    ctx.conn.confirm("psubscribe", &["news.*"], 0).await;
    let mut sub = pending.await.unwrap().unwrap();

    ctx.conn.push_pmessage("news.*", "news.sports", "goal").await;
    let message = next_message(&mut sub).await;
    assert_eq!(message.pattern, Some(Bytes::from("news.*")));
    assert_eq!(message.channel, Bytes::from("news.sports"));
    assert_eq!(message.payload, Bytes::from("goal"));
}

#[tokio::test]
async fn test_message_for_other_channel_is_not_delivered() {
    let mut ctx = TestContext::new().await;
    let mut sub = subscribe(&mut ctx, &["news"]).await;

    ctx.conn.push_message("weather", "rain").await;
    ctx.conn.push_message("news", "hello").await;

    assert_eq!(next_message(&mut sub).await.channel, Bytes::from("news"));
    assert!(sub.try_recv().is_none());
}

// ===== Reconnect Tests =====

#[tokio::test]
async fn test_subscriptions_are_replayed_after_reconnect() {
    let mut ctx = TestContext::new().await;
    let mut channel_sub = subscribe(&mut ctx, &["alerts"]).await;

    let client = ctx.client.clone();
    let pending = tokio::spawn(async move { client.psubscribe(["news.*"]).await });
    ctx.conn.expect(&["PSUBSCRIBE", "news.*"]).await;
    ctx.conn.confirm("psubscribe", &["news.*"], 1).await;
    let mut pattern_sub = pending.await.unwrap().unwrap();

    ctx.force_reconnect().await;
    ctx.conn.expect(&["SUBSCRIBE", "alerts"]).await;
    ctx.conn.expect(&["PSUBSCRIBE", "news.*"]).await;
    ctx.conn.confirm("subscribe", &["alerts"], 0).await;
    ctx.conn.confirm("psubscribe", &["news.*"], 1).await;

    ctx.conn.push_message("alerts", "fire").await;
    ctx.conn.push_pmessage("news.*", "news.tech", "launch").await;
    assert_eq!(next_message(&mut channel_sub).await.payload, Bytes::from("fire"));
    assert_eq!(next_message(&mut pattern_sub).await.payload, Bytes::from("launch"));

    // Replay confirmations were consumed, so replies line up again.
    let ping = ctx.client.send::<String>(Command::new("PING"));
    ctx.conn.expect(&["PING"]).await;
    ctx.conn.send(RespFrame::SimpleString("PONG".into())).await;
    assert_eq!(ping.await.unwrap(), "PONG");
}

#[tokio::test]
async fn test_partially_confirmed_subscribe_is_resent_in_full() {
    let mut ctx = TestContext::new().await;
    let client = ctx.client.clone();
    let pending = tokio::spawn(async move { client.subscribe(["a", "b", "c"]).await });
    ctx.conn.expect(&["SUBSCRIBE", "a", "b", "c"]).await;
    ctx.conn.confirm("subscribe", &["a"], 0).await;

    ctx.force_reconnect().await;
    let ping = ctx.client.send::<String>(Command::new("PING"));

    // Replay of the registry, then the interrupted request itself.
    let mut replayed = ctx.conn.read_command().await;
    replayed[1..].sort();
    assert_eq!(replayed, ["SUBSCRIBE", "a", "b", "c"]);
    ctx.conn.expect(&["SUBSCRIBE", "a", "b", "c"]).await;
    ctx.conn.expect(&["PING"]).await;

    ctx.conn.confirm("subscribe", &["a", "b", "c"], 0).await;
    ctx.conn.confirm("subscribe", &["a", "b", "c"], 0).await;
    ctx.conn.send(RespFrame::SimpleString("PONG".into())).await;

    let _sub = pending.await.unwrap().unwrap();
    assert_eq!(ping.await.unwrap(), "PONG");
}

// ===== Unsubscribe Tests =====

#[tokio::test]
async fn test_unsubscribe_ends_the_subscription() {
    let mut ctx = TestContext::new().await;
    let mut sub = subscribe(&mut ctx, &["news"]).await;

    let client = ctx.client.clone();
    let pending = tokio::spawn(async move { client.unsubscribe(["news"]).await });
    ctx.conn.expect(&["UNSUBSCRIBE", "news"]).await;
    ctx.conn
        .send(RespFrame::Array(vec![
            bulk_frame("unsubscribe"),
            bulk_frame("news"),
            RespFrame::Integer(0),
        ]))
        .await;
    pending.await.unwrap().unwrap();

    let end = tokio::time::timeout(STEP_TIMEOUT, sub.recv()).await.unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn test_dropped_subscription_is_not_replayed() {
    let mut ctx = TestContext::new().await;
    let sub = subscribe(&mut ctx, &["news"]).await;
    drop(sub);

    ctx.force_reconnect().await;
    assert!(ctx.conn.silent_for(Duration::from_millis(50)).await);
}

#[tokio::test]
async fn test_subscribe_requires_a_channel() {
    let ctx = TestContext::new().await;
    let result = ctx.client.subscribe(Vec::<String>::new()).await;
    assert!(matches!(
        result,
        Err(spineldb_client::ClientError::Encoding(_))
    ));
}

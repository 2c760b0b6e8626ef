// tests/integration/pipeline_test.rs

//! Integration tests for reply ordering on a single pipelined connection

use super::fixtures::*;
use super::test_helpers::*;
use spineldb_client::core::connection::ConnectionState;
use spineldb_client::core::CommandStatus;
use spineldb_client::{ClientError, Command, RespFrame};
use std::time::Duration;

fn get(key: &str) -> Command {
    Command::new("GET").key(key)
}

// ===== Ordering Tests =====

#[tokio::test]
async fn test_replies_complete_in_submission_order() {
    let mut ctx = TestContext::new().await;

    let keys: Vec<String> = (0..5).map(|i| unique_key("order", i)).collect();
    let handles: Vec<_> = keys
        .iter()
        .map(|k| ctx.client.send::<String>(get(k)))
        .collect();

    for key in &keys {
        ctx.conn.expect(&["GET", key.as_str()]).await;
    }
    for i in 0..keys.len() {
        ctx.conn.bulk(&format!("value_{i}")).await;
    }

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), format!("value_{i}"));
    }
}

#[tokio::test]
async fn test_commands_from_cloned_clients_share_one_queue() {
    let mut ctx = TestContext::new().await;
    let other = ctx.client.clone();

    let first = ctx.client.send::<String>(get(TEST_KEY1));
    let second = other.send::<String>(get(TEST_KEY2));

    ctx.conn.expect(&["GET", TEST_KEY1]).await;
    ctx.conn.expect(&["GET", TEST_KEY2]).await;
    ctx.conn.bulk(TEST_VALUE1).await;
    ctx.conn.bulk(TEST_VALUE2).await;

    assert_eq!(first.await.unwrap(), TEST_VALUE1);
    assert_eq!(second.await.unwrap(), TEST_VALUE2);
}

// ===== Error Reply Tests =====

#[tokio::test]
async fn test_error_reply_fails_only_its_command() {
    let mut ctx = TestContext::new().await;

    let first = ctx.client.send::<String>(get(TEST_KEY1));
    let second = ctx.client.send::<String>(get(TEST_KEY2));
    ctx.conn.expect(&["GET", TEST_KEY1]).await;
    ctx.conn.expect(&["GET", TEST_KEY2]).await;

    ctx.conn
        .error("WRONGTYPE Operation against a key holding the wrong kind of value")
        .await;
    ctx.conn.bulk(TEST_VALUE2).await;

    assert_eq!(
        first.await,
        Err(ClientError::Server(
            "WRONGTYPE Operation against a key holding the wrong kind of value".into()
        ))
    );
    assert_eq!(second.await.unwrap(), TEST_VALUE2);
    assert_eq!(ctx.client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_reply_of_the_wrong_type_fails_the_handle_only() {
    let mut ctx = TestContext::new().await;

    let counter = ctx.client.send::<i64>(Command::new("INCR").key(TEST_KEY1));
    let value = ctx.client.send::<String>(get(TEST_KEY2));
    ctx.conn.expect(&["INCR", TEST_KEY1]).await;
    ctx.conn.expect(&["GET", TEST_KEY2]).await;
    ctx.conn.bulk("not-a-number").await;
    ctx.conn.bulk(TEST_VALUE2).await;

    assert!(counter.await.is_err());
    assert_eq!(value.await.unwrap(), TEST_VALUE2);
}

#[tokio::test]
async fn test_empty_command_name_is_rejected_without_writing() {
    let mut ctx = TestContext::new().await;

    let result = ctx.client.send::<RespFrame>(Command::new("")).await;
    assert!(matches!(result, Err(ClientError::Encoding(_))));
    assert!(ctx.conn.silent_for(Duration::from_millis(50)).await);
    assert_eq!(ctx.client.outbound_bytes(), 0);
}

// ===== Cancellation Tests =====

#[tokio::test]
async fn test_cancelled_sent_command_still_consumes_its_reply() {
    let mut ctx = TestContext::new().await;

    let first = ctx.client.send::<String>(get(TEST_KEY1));
    let second = ctx.client.send::<String>(get(TEST_KEY2));
    ctx.conn.expect(&["GET", TEST_KEY1]).await;
    ctx.conn.expect(&["GET", TEST_KEY2]).await;

    assert!(first.cancel());
    assert_eq!(first.status(), CommandStatus::Cancelled);

    ctx.conn.bulk(TEST_VALUE1).await;
    ctx.conn.bulk(TEST_VALUE2).await;

    assert_eq!(first.await, Err(ClientError::Cancelled));
    assert_eq!(second.await.unwrap(), TEST_VALUE2);

    // The stream is still aligned for the next command.
    let third = ctx.client.send::<String>(get(TEST_KEY3));
    ctx.conn.expect(&["GET", TEST_KEY3]).await;
    ctx.conn.bulk(TEST_VALUE3).await;
    assert_eq!(third.await.unwrap(), TEST_VALUE3);
}

#[tokio::test]
async fn test_cancel_after_completion_is_a_no_op() {
    let mut ctx = TestContext::new().await;

    let mut handle = ctx.client.send::<String>(Command::new("PING"));
    ctx.conn.expect(&["PING"]).await;
    ctx.conn.send(RespFrame::SimpleString("PONG".into())).await;

    assert_eq!((&mut handle).await.unwrap(), "PONG");
    assert!(!handle.cancel());
    assert_eq!(handle.status(), CommandStatus::Completed);
}

#[tokio::test]
async fn test_dropping_a_handle_does_not_desync_the_stream() {
    let mut ctx = TestContext::new().await;

    drop(ctx.client.send::<String>(get(TEST_KEY1)));
    let second = ctx.client.send::<String>(get(TEST_KEY2));
    ctx.conn.expect(&["GET", TEST_KEY1]).await;
    ctx.conn.expect(&["GET", TEST_KEY2]).await;
    ctx.conn.bulk(TEST_VALUE1).await;
    ctx.conn.bulk(TEST_VALUE2).await;

    assert_eq!(second.await.unwrap(), TEST_VALUE2);
}

// ===== Timeout Tests =====

#[tokio::test]
async fn test_timed_out_command_keeps_the_stream_aligned() {
    let mut config = test_config();
    config.command_timeout = Some(Duration::from_millis(50));
    let mut ctx = TestContext::with_config(config).await;

    let slow = ctx.client.send::<String>(get(TEST_KEY1));
    ctx.conn.expect(&["GET", TEST_KEY1]).await;
    assert_eq!(slow.await, Err(ClientError::Timeout));

    let next = ctx.client.send::<String>(get(TEST_KEY2));
    ctx.conn.expect(&["GET", TEST_KEY2]).await;
    // The late reply belongs to the timed-out command and must be discarded.
    ctx.conn.bulk(TEST_VALUE1).await;
    ctx.conn.bulk(TEST_VALUE2).await;
    assert_eq!(next.await.unwrap(), TEST_VALUE2);
}

#[tokio::test]
async fn test_send_with_timeout_from_a_plain_thread() {
    let mut config = test_config();
    config.command_timeout = Some(Duration::from_millis(50));
    let mut ctx = TestContext::with_config(config).await;

    let client = ctx.client.clone();
    let handle = std::thread::spawn(move || client.send::<String>(get(TEST_KEY1)))
        .join()
        .expect("send panicked outside the runtime");
    ctx.conn.expect(&["GET", TEST_KEY1]).await;
    assert_eq!(handle.await, Err(ClientError::Timeout));
}

// ===== Multi-Reply Tests =====

#[tokio::test]
async fn test_multi_reply_command_completes_after_last_reply() {
    let mut ctx = TestContext::new().await;

    let multi = ctx
        .client
        .send::<RespFrame>(Command::new("SUBSCRIBE").args(["a", "b"]).expect_replies(2));
    let after = ctx.client.send::<String>(Command::new("PING"));
    ctx.conn.expect(&["SUBSCRIBE", "a", "b"]).await;
    ctx.conn.expect(&["PING"]).await;

    ctx.conn.confirm("subscribe", &["a", "b"], 0).await;
    ctx.conn.send(RespFrame::SimpleString("PONG".into())).await;

    assert!(multi.await.is_ok());
    assert_eq!(after.await.unwrap(), "PONG");
}

// ===== Protocol Error Tests =====

#[tokio::test]
async fn test_undecodable_reply_drops_connection_and_requeues() {
    let mut ctx = TestContext::new().await;

    let handle = ctx.client.send::<String>(get(TEST_KEY1));
    ctx.conn.expect(&["GET", TEST_KEY1]).await;
    ctx.conn.write_raw(b"?garbage\r\n").await;

    ctx.force_reconnect().await;
    ctx.conn.expect(&["GET", TEST_KEY1]).await;
    ctx.conn.bulk(TEST_VALUE1).await;

    assert_eq!(handle.await.unwrap(), TEST_VALUE1);
}

#[tokio::test]
async fn test_partial_reply_waits_for_remaining_bytes() {
    let mut ctx = TestContext::new().await;

    let handle = ctx.client.send::<String>(get(TEST_KEY1));
    ctx.conn.expect(&["GET", TEST_KEY1]).await;
    ctx.conn.write_raw(b"$12\r\ntest_").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    ctx.conn.write_raw(b"value_1\r\n").await;

    assert_eq!(handle.await.unwrap(), TEST_VALUE1);
}

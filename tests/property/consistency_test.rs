// tests/property/consistency_test.rs

//! Property-based tests for reply ordering
//! Tests that cancellation never shifts a reply onto the wrong command

use crate::test_helpers::TestContext;
use bytes::BytesMut;
use proptest::prelude::*;
use spineldb_client::core::command::QueuedCommand;
use spineldb_client::core::connection::{CommandQueue, ReplyOutcome};
use spineldb_client::core::protocol::RespFrame;
use spineldb_client::{ClientError, Command};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_queue_matches_replies_despite_cancellation(
        cancel_before_write in prop::collection::vec(any::<bool>(), 1..40),
        cancel_after_write in prop::collection::vec(any::<bool>(), 40),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut queue = CommandQueue::new();
            let mut handles = Vec::new();
            for i in 0..cancel_before_write.len() {
                let (queued, handle) =
                    QueuedCommand::new::<i64>(Command::new("GET").key(format!("k{i}"))).unwrap();
                queue.push(queued);
                handles.push(handle);
            }
            for (handle, cancel) in handles.iter().zip(&cancel_before_write) {
                if *cancel {
                    handle.cancel();
                }
            }
            queue.write_pending(&mut BytesMut::new());

            let mut cancelled: Vec<bool> = cancel_before_write.clone();
            for (i, handle) in handles.iter().enumerate() {
                if cancel_after_write[i] && handle.cancel() {
                    cancelled[i] = true;
                }
            }

            // The server answers every written command with its index.
            let written: Vec<usize> = (0..handles.len()).filter(|i| !cancel_before_write[*i]).collect();
            for i in &written {
                let outcome = queue.complete_head(RespFrame::Integer(*i as i64));
                let expected = if cancelled[*i] { ReplyOutcome::Discarded } else { ReplyOutcome::Completed };
                assert_eq!(outcome, expected);
            }
            assert!(queue.is_empty());

            for (i, handle) in handles.into_iter().enumerate() {
                match handle.await {
                    Ok(value) => {
                        assert!(!cancelled[i]);
                        assert_eq!(value, i as i64);
                    }
                    Err(e) => {
                        assert!(cancelled[i]);
                        assert_eq!(e, ClientError::Cancelled);
                    }
                }
            }
        });
    }

    #[test]
    fn test_client_pipeline_keeps_order_under_cancellation(
        cancel in prop::collection::vec(any::<bool>(), 1..12),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut ctx = TestContext::new().await;
            let handles: Vec<_> = (0..cancel.len())
                .map(|i| ctx.client.send::<String>(Command::new("GET").key(format!("k{i}"))))
                .collect();
            for i in 0..cancel.len() {
                let key = format!("k{i}");
                ctx.conn.expect(&["GET", key.as_str()]).await;
            }
            for (handle, c) in handles.iter().zip(&cancel) {
                if *c {
                    handle.cancel();
                }
            }
            for i in 0..cancel.len() {
                ctx.conn.bulk(&format!("v{i}")).await;
            }
            for (i, handle) in handles.into_iter().enumerate() {
                let result = handle.await;
                if cancel[i] {
                    assert_eq!(result, Err(ClientError::Cancelled));
                } else {
                    assert_eq!(result.unwrap(), format!("v{i}"));
                }
            }
        });
    }
}

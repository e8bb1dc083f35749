/*!
 * Inbound message handling
 */

use crate::common::*;
use p2p_dispatch::models::messages::{
    DisbandCluster, Execute, ExecuteBatch, RollCallResponse,
};
use p2p_dispatch::models::ExecutionRequestTemplate;
use p2p_dispatch::{Code, HeadError, Message, Request};
use pretty_assertions::assert_eq;

fn encode(message: impl Into<Message>) -> Vec<u8> {
    message.into().to_bytes().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_client_execute_gets_response() {
    let net = Network::new(vec![Worker::new(1).with_stdout("done")]);
    let ids = net.worker_ids();

    let payload = encode(Execute {
        request: Request::new(FUNCTION_ID, METHOD).with_arguments(["x"]),
        topic: None,
    });
    net.head.process(CLIENT, &payload).await.unwrap();

    let replies = net.sent_to(&CLIENT);
    assert_eq!(replies.len(), 1);
    match &replies[0] {
        Message::ExecuteResponse(res) => {
            assert_eq!(res.code, Code::Ok);
            assert_eq!(res.results[&ids[0]].result.result.stdout, "done");
            assert_eq!(res.cluster.peers, vec![ids[0]]);
        }
        other => panic!("unexpected reply {:?}", other),
    }

    assert_eq!(
        net.head
            .metrics()
            .counter("head_messages_processed", &[("type", "MsgExecute")]),
        Some(1.0)
    );
}

#[tokio::test(start_paused = true)]
async fn test_client_batch_failure_is_reported() {
    let net = Network::new(vec![]);

    let payload = encode(ExecuteBatch::new(
        ExecutionRequestTemplate::new(FUNCTION_ID, METHOD),
        arguments(2),
    ));
    net.head.process(CLIENT, &payload).await.unwrap();

    let replies = net.sent_to(&CLIENT);
    assert_eq!(replies.len(), 1);
    match &replies[0] {
        Message::ExecuteBatchResponse(res) => {
            assert_eq!(res.code, Code::Timeout);
            assert!(res.chunks.is_empty());
            assert!(res.message.is_some());
        }
        other => panic!("unexpected reply {:?}", other),
    }
}

#[tokio::test]
async fn test_worker_messages_are_rejected() {
    let net = Network::new(vec![]);

    let err = net
        .head
        .process(CLIENT, &encode(DisbandCluster { request_id: "r".into() }))
        .await
        .unwrap_err();

    assert!(matches!(err, HeadError::UnsupportedMessage(ref kind) if kind == "MsgDisbandCluster"));
    assert_eq!(err.code(), Code::Invalid);
    assert!(net.sent_to(&CLIENT).is_empty());
}

#[tokio::test]
async fn test_garbage_payload_is_codec_error() {
    let net = Network::new(vec![]);

    let err = net.head.process(CLIENT, b"{not json").await.unwrap_err();
    assert!(matches!(err, HeadError::Codec(_)));
    assert_eq!(err.code(), Code::Invalid);

    let err = net
        .head
        .process(CLIENT, br#"{"type":"MsgUnknown"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, HeadError::Codec(_)));
}

#[tokio::test]
async fn test_stale_roll_call_reply_is_dropped() {
    let net = Network::new(vec![]);
    let worker = Worker::new(1).id;

    let reply = RollCallResponse {
        function_id: FUNCTION_ID.into(),
        request_id: "finished".into(),
        code: Code::Accepted,
        batch_support: false,
    };
    net.head.process(worker, &encode(reply)).await.unwrap();

    assert!(net.head.roll_calls().is_empty());
    assert_eq!(
        net.head
            .metrics()
            .counter("head_messages_processed", &[("type", "MsgRollCallResponse")]),
        Some(1.0)
    );
}

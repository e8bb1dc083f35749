/*!
 * Single execution against simulated workers
 */

use crate::common::*;
use p2p_dispatch::models::{Config, Request};
use p2p_dispatch::{Code, Message};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::time::Instant;

fn request(config: Config) -> Request {
    Request::new(FUNCTION_ID, METHOD)
        .with_arguments(["hello", "world"])
        .with_config(config)
}

fn work_orders(net: &Network, peer: &p2p_dispatch::PeerId) -> usize {
    net.sent_to(peer)
        .iter()
        .filter(|msg| matches!(msg, Message::WorkOrder(_)))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_single_execution_goes_to_first_volunteer() {
    let net = Network::new(vec![
        Worker::new(3),
        Worker::new(1).with_stdout("first"),
        Worker::new(2),
    ]);
    let ids = net.worker_ids();

    let outcome = net.head.execute_function(request(Config::default()), None).await;

    assert_eq!(outcome.code, Code::Ok);
    assert_eq!(outcome.message, None);
    assert_eq!(outcome.results.len(), 1);

    let result = &outcome.results[&ids[1]];
    assert_eq!(result.result.result.stdout, "first");
    assert_eq!(result.result.code, Code::Ok);
    assert_eq!(result.result.request_id, outcome.request_id);

    assert_eq!(work_orders(&net, &ids[0]), 0);
    assert_eq!(work_orders(&net, &ids[1]), 1);
    assert_eq!(work_orders(&net, &ids[2]), 0);
    assert!(net.head.roll_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_roll_call_uses_requested_topic() {
    let net = Network::new(vec![Worker::new(1)]);

    let outcome = net
        .head
        .execute_function(request(Config::default()), Some("subgroup"))
        .await;
    assert_eq!(outcome.code, Code::Ok);

    let published = net.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "subgroup");
    assert!(matches!(published[0].1, Message::RollCall(_)));
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_volunteers_do_not_count() {
    let net = Network::new(vec![Worker::new(1).disconnected()]);

    let outcome = net.head.execute_function(request(Config::default()), None).await;
    assert_eq!(outcome.code, Code::Timeout);
    assert!(outcome.results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pbft_returns_quorum_group_early() {
    let honest = (1..=3).map(|i| Worker::new(i).with_stdout("42"));
    let divergent = (4..=7).map(|i| {
        Worker::new(i)
            .with_stdout(&format!("wrong-{}", i))
            .with_result_delay(Duration::from_millis(900))
    });
    let net = Network::new(honest.chain(divergent).collect());
    let ids = net.worker_ids();

    let config = Config {
        node_count: 7,
        consensus_algorithm: "pbft".into(),
        ..Default::default()
    };

    let started = Instant::now();
    let outcome = net.head.execute_function(request(config), None).await;

    assert_eq!(outcome.code, Code::Ok);
    let mut winners: Vec<_> = outcome.results.keys().copied().collect();
    winners.sort();
    let mut expected = ids[..3].to_vec();
    expected.sort();
    assert_eq!(winners, expected);
    assert!(outcome
        .results
        .values()
        .all(|r| r.result.result.stdout == "42"));

    // Returned before the divergent peers replied
    assert!(started.elapsed() < Duration::from_millis(900));
    assert_eq!(outcome.cluster.peers.len(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_pbft_needs_four_replicas() {
    let net = Network::new((1..=3).map(Worker::new).collect());
    let config = Config {
        node_count: 3,
        consensus_algorithm: "pbft".into(),
        ..Default::default()
    };

    let outcome = net.head.execute_function(request(config), None).await;
    assert_eq!(outcome.code, Code::Invalid);
    assert!(outcome.message.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_oversized_timeout_is_rejected() {
    let net = Network::new(vec![Worker::new(1)]);
    let config = Config {
        timeout: u64::MAX,
        ..Default::default()
    };

    let outcome = net.head.execute_function(request(config), None).await;
    assert_eq!(outcome.code, Code::Invalid);
    assert!(outcome.message.unwrap().contains("timeout"));
    assert!(net.published().is_empty());
    assert_eq!(work_orders(&net, &net.worker_ids()[0]), 0);
}

#[tokio::test(start_paused = true)]
async fn test_multi_node_execution_forms_and_disbands_cluster() {
    let net = Network::new((1..=3).map(Worker::new).collect());
    let config = Config {
        node_count: 3,
        ..Default::default()
    };

    let outcome = net.head.execute_function(request(config), None).await;
    assert_eq!(outcome.code, Code::Ok);
    assert_eq!(outcome.results.len(), 3);

    for id in net.worker_ids() {
        let kinds: Vec<&str> = net.sent_to(&id).iter().map(|m| m.type_name()).collect();
        assert_eq!(kinds, vec!["MsgFormCluster", "MsgWorkOrder", "MsgDisbandCluster"]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_cluster_refusal_fails_execution() {
    let net = Network::new(vec![
        Worker::new(1),
        Worker::new(2).refusing_clusters(),
    ]);
    let config = Config {
        node_count: 2,
        consensus_algorithm: "raft".into(),
        ..Default::default()
    };

    let outcome = net.head.execute_function(request(config), None).await;
    assert_eq!(outcome.code, Code::Error);
    assert!(outcome.message.unwrap().contains("Cluster formation failed"));

    for id in net.worker_ids() {
        assert!(!net
            .sent_to(&id)
            .iter()
            .any(|m| matches!(m, Message::WorkOrder(_))));
    }
}

#[tokio::test(start_paused = true)]
async fn test_threshold_reports_partial_content() {
    let net = Network::new(vec![
        Worker::new(1),
        Worker::new(2),
        Worker::new(3).silent(),
    ]);
    let config = Config {
        node_count: 3,
        consensus_algorithm: "none".into(),
        threshold: 1.0,
        ..Default::default()
    };

    let outcome = net.head.execute_function(request(config), None).await;
    assert_eq!(outcome.code, Code::PartialContent);
    assert_eq!(outcome.results.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_silent_worker_times_out() {
    let net = Network::new(vec![Worker::new(1).silent()]);

    let outcome = net.head.execute_function(request(Config::default()), None).await;
    assert_eq!(outcome.code, Code::Timeout);
}

/*!
 * Batch execution against simulated workers
 */

use crate::common::*;
use p2p_dispatch::models::messages::ExecuteBatch;
use p2p_dispatch::models::ExecutionRequestTemplate;
use p2p_dispatch::{BatchStore, Code, HeadError, Message, PeerId, Status};
use pretty_assertions::assert_eq;

fn batch(count: usize) -> ExecuteBatch {
    ExecuteBatch::new(
        ExecutionRequestTemplate::new(FUNCTION_ID, METHOD),
        arguments(count),
    )
}

fn assigned(net: &Network, peer: &PeerId) -> Vec<Vec<String>> {
    net.sent_to(peer)
        .into_iter()
        .filter_map(|msg| match msg {
            Message::WorkOrderBatch(order) => Some(order.arguments),
            _ => None,
        })
        .flatten()
        .collect()
}

async fn item_statuses(net: &Network, batch_id: &str) -> Vec<Status> {
    net.store
        .find_work_items(batch_id, None, &[])
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.status)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_batch_round_robin_completes() {
    let net = Network::new(vec![Worker::new(1), Worker::new(2), Worker::new(3)]);
    let ids = net.worker_ids();

    let response = net.head.execute_function_batch(batch(10)).await.unwrap();

    assert_eq!(response.code, Code::Ok);
    assert_eq!(response.chunks.len(), 3);

    let sizes: Vec<usize> = ids.iter().map(|id| assigned(&net, id).len()).collect();
    assert_eq!(sizes, vec![4, 3, 3]);
    assert_eq!(
        assigned(&net, &ids[0]),
        vec![
            vec!["arg-0".to_string()],
            vec!["arg-3".to_string()],
            vec!["arg-6".to_string()],
            vec!["arg-9".to_string()],
        ]
    );

    for (chunk_id, chunk) in &response.chunks {
        assert!(chunk_id.starts_with(&response.request_id));
        assert!(chunk.results.values().all(|r| r.succeeded()));
        assert_eq!(
            net.store.get_chunk(chunk_id).await.unwrap().status,
            Status::Done
        );
    }

    let statuses = item_statuses(&net, &response.request_id).await;
    assert_eq!(statuses.len(), 10);
    assert!(statuses.iter().all(|s| *s == Status::Done));
    assert_eq!(
        net.store.get_batch(&response.request_id).await.unwrap().status,
        Status::Done
    );
}

#[tokio::test(start_paused = true)]
async fn test_batch_only_recruits_batch_capable_workers() {
    let net = Network::new(vec![Worker::new(1), Worker::new(2).without_batch_support()]);
    let ids = net.worker_ids();

    let response = net.head.execute_function_batch(batch(4)).await.unwrap();

    assert_eq!(response.code, Code::Ok);
    assert_eq!(assigned(&net, &ids[0]).len(), 4);
    assert!(assigned(&net, &ids[1]).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_arguments_run_once() {
    let net = Network::new(vec![Worker::new(1)]);
    let ids = net.worker_ids();

    let mut req = batch(3);
    req.arguments.push(vec!["arg-1".into()]);

    let response = net.head.execute_function_batch(req).await.unwrap();
    assert_eq!(response.code, Code::Ok);
    assert_eq!(net.executed(&ids[0]).len(), 3);
    assert_eq!(item_statuses(&net, &response.request_id).await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_chunk_is_not_done() {
    let net = Network::new(vec![Worker::new(1).reporting_at_most(2)]);

    let response = net.head.execute_function_batch(batch(3)).await.unwrap();
    assert_eq!(response.code, Code::PartialContent);

    let (chunk_id, chunk) = response.chunks.iter().next().unwrap();
    assert_eq!(chunk.results.len(), 2);
    assert_eq!(
        net.store.get_chunk(chunk_id).await.unwrap().status,
        Status::Failed
    );

    let mut statuses = item_statuses(&net, &response.request_id).await;
    statuses.sort_by_key(|s| s.code());
    assert_eq!(statuses, vec![Status::Failed, Status::Done, Status::Done]);
    assert_eq!(
        net.store.get_batch(&response.request_id).await.unwrap().status,
        Status::InProgress
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_executions_mark_items_failed() {
    let net = Network::new(vec![Worker::new(1).with_exit_code(1)]);

    let response = net.head.execute_function_batch(batch(2)).await.unwrap();
    assert_eq!(response.code, Code::Ok);

    let statuses = item_statuses(&net, &response.request_id).await;
    assert_eq!(statuses, vec![Status::Failed, Status::Failed]);

    let items = net
        .store
        .find_work_items(&response.request_id, None, &[])
        .await
        .unwrap();
    assert!(items.iter().all(|item| item.attempts == 1));
}

#[tokio::test(start_paused = true)]
async fn test_partial_delivery_leaves_chunk_for_resume() {
    let net = Network::new(vec![Worker::new(1), Worker::new(2).unreachable()]);
    let ids = net.worker_ids();

    let response = net.head.execute_function_batch(batch(4)).await.unwrap();

    assert_eq!(response.code, Code::PartialContent);
    assert_eq!(response.chunks.len(), 1);
    assert_eq!(response.chunks.values().next().unwrap().peer, ids[0]);

    let created = net
        .store
        .find_work_items(&response.request_id, None, &[Status::Created])
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|item| item.attempts == 0 && !item.chunk_id.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn test_total_delivery_failure_is_an_error() {
    let net = Network::new(vec![Worker::new(1).unreachable()]);

    let err = net.head.execute_function_batch(batch(2)).await.unwrap_err();
    match err {
        HeadError::PartialDelivery(failures) => {
            assert_eq!(failures.targets(), net.worker_ids());
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_batch_without_volunteers_times_out() {
    let net = Network::new(vec![]);

    let err = net.head.execute_function_batch(batch(2)).await.unwrap_err();
    assert!(matches!(err, HeadError::RollCallTimeout));
    assert_eq!(
        net.store.find_batches(&Status::INCOMPLETE_BATCH).await.unwrap().len(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_oversized_timeout_is_rejected_before_persisting() {
    let net = Network::new(vec![Worker::new(1)]);

    let mut req = batch(2);
    req.template.config.timeout = u64::MAX;
    let err = net.head.execute_function_batch(req).await.unwrap_err();

    assert!(matches!(err, HeadError::Configuration(ref msg) if msg.contains("timeout")));
    assert_eq!(err.code(), Code::Invalid);
    assert!(net.published().is_empty());
    assert!(net
        .store
        .find_batches(&Status::INCOMPLETE_BATCH)
        .await
        .unwrap()
        .is_empty());
}

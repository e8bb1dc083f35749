/*!
 * Batch resumption
 */

use crate::common::*;
use p2p_dispatch::models::messages::ExecuteBatch;
use p2p_dispatch::models::ExecutionRequestTemplate;
use p2p_dispatch::store::{work_item_id, ExecuteBatchRecord, WorkItemRecord};
use p2p_dispatch::{BatchStore, Code, ResumeTask, Status};
use pretty_assertions::assert_eq;
use std::time::Duration;

fn batch(count: usize) -> ExecuteBatch {
    ExecuteBatch::new(
        ExecutionRequestTemplate::new(FUNCTION_ID, METHOD),
        arguments(count),
    )
}

/// A batch that was accepted but never dispatched, plus one item finished earlier
async fn persist_undispatched(net: &Network, batch_id: &str) -> Vec<String> {
    let req = batch(6);
    let record = ExecuteBatchRecord::from_request(batch_id, &req, 0);
    net.store.create_batch(&record).await.unwrap();

    let items: Vec<WorkItemRecord> = req
        .arguments
        .iter()
        .map(|args| {
            let id = work_item_id(batch_id, req.template.execution_id(args).as_str());
            WorkItemRecord::new(id, batch_id, args.clone())
        })
        .collect();
    net.store.create_work_items(&items).await.unwrap();
    net.store
        .update_work_item_status(Status::Done, &[items[0].id.clone()])
        .await
        .unwrap();

    items.into_iter().map(|item| item.id).collect()
}

#[tokio::test(start_paused = true)]
async fn test_resume_runs_only_unfinished_items() {
    let net = Network::new(vec![Worker::new(1), Worker::new(2)]);
    let ids = net.worker_ids();
    persist_undispatched(&net, "batch-d").await;

    let response = net
        .head
        .continue_batch_execution("batch-d")
        .await
        .unwrap()
        .expect("pending work");

    assert_eq!(response.code, Code::Ok);
    assert_eq!(response.request_id, "batch-d");

    let mut executed: Vec<Vec<String>> = ids.iter().flat_map(|id| net.executed(id)).collect();
    executed.sort();
    assert_eq!(executed, arguments(6)[1..].to_vec());

    let items = net.store.find_work_items("batch-d", None, &[]).await.unwrap();
    assert_eq!(items.len(), 6);
    assert!(items.iter().all(|item| item.status == Status::Done));
    assert_eq!(net.store.get_batch("batch-d").await.unwrap().status, Status::Done);

    // Nothing left to do
    assert!(net.head.continue_batch_execution("batch-d").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_resume_retries_undelivered_chunk() {
    let net = Network::new(vec![Worker::new(1), Worker::new(2).unreachable()]);
    let ids = net.worker_ids();

    let first = net.head.execute_function_batch(batch(4)).await.unwrap();
    assert_eq!(first.code, Code::PartialContent);
    assert_eq!(
        net.store.get_batch(&first.request_id).await.unwrap().status,
        Status::InProgress
    );

    net.set_reachable(&ids[1], true);
    let resumed = net.head.resume_unfinished_batches().await.unwrap();
    assert_eq!(resumed, 1);

    let items = net
        .store
        .find_work_items(&first.request_id, None, &[])
        .await
        .unwrap();
    assert!(items.iter().all(|item| item.status == Status::Done));
    assert_eq!(
        net.store.get_batch(&first.request_id).await.unwrap().status,
        Status::Done
    );
    assert_eq!(net.executed(&ids[0]).len() + net.executed(&ids[1]).len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_items_give_up_after_max_attempts() {
    let net = Network::new(vec![Worker::new(1).with_exit_code(2)]);

    let mut req = batch(2);
    req.max_attempts = 2;
    let first = net.head.execute_function_batch(req).await.unwrap();
    let batch_id = first.request_id;

    // Second attempt
    assert!(net.head.continue_batch_execution(&batch_id).await.unwrap().is_some());
    let items = net.store.find_work_items(&batch_id, None, &[]).await.unwrap();
    assert!(items.iter().all(|i| i.status == Status::Failed && i.attempts == 2));

    // Out of attempts
    assert!(net.head.continue_batch_execution(&batch_id).await.unwrap().is_none());
    let items = net.store.find_work_items(&batch_id, None, &[]).await.unwrap();
    assert!(items.iter().all(|i| i.status == Status::PermanentlyFailed));
    assert_eq!(net.store.get_batch(&batch_id).await.unwrap().status, Status::Failed);

    assert_eq!(net.head.resume_unfinished_batches().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resume_task_finishes_stored_batch() {
    let net = Network::new(vec![Worker::new(1)]);
    persist_undispatched(&net, "batch-bg").await;

    let task = ResumeTask::spawn(net.head.clone());
    task.trigger();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(net.store.get_batch("batch-bg").await.unwrap().status, Status::Done);
    task.shutdown().await;
}

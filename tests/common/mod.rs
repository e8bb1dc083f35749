/*!
 * Simulated Network
 *
 * In-process host with scripted worker nodes. Workers answer roll calls,
 * work orders and cluster requests by feeding encoded replies back through
 * `HeadNode::process`, after a configurable delay.
 */

#![allow(dead_code)]

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use p2p_dispatch::core::HostError;
use p2p_dispatch::models::messages::{
    FormClusterResponse, WorkOrderBatchResponse, WorkOrderResponse,
};
use p2p_dispatch::models::{
    function_invocation, BatchFunctionResult, ExecutionResult, Message, NodeResult, RuntimeOutput,
};
use p2p_dispatch::{Code, HeadConfig, HeadNode, Host, MemoryBatchStore, PeerId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use time::OffsetDateTime;

pub const FUNCTION_ID: &str = "bafybeia24v4czavtpjv2co3j54o4a5ztduqcpyyinerjgncx7s2s22s7ea";
pub const METHOD: &str = "hello-world.wasm";

pub const HEAD: PeerId = PeerId::from_bytes([0; 32]);
pub const CLIENT: PeerId = PeerId::from_bytes([200; 32]);

type OutputFn = Arc<dyn Fn(&[String]) -> RuntimeOutput + Send + Sync>;

/// Scripted worker behaviour
#[derive(Clone)]
pub struct Worker {
    pub key: SigningKey,
    pub id: PeerId,
    pub batch_support: bool,
    pub connected: bool,
    pub reachable: bool,
    pub responds: bool,
    pub cluster_ok: bool,
    pub roll_call_delay: Duration,
    pub result_delay: Duration,
    /// Report at most this many items of a batch chunk
    pub batch_limit: Option<usize>,
    output: OutputFn,
}

impl Worker {
    pub fn new(seed: u8) -> Self {
        let key = SigningKey::from_bytes(&[seed; 32]);
        let id = PeerId::from_public_key(&key.verifying_key());
        Self {
            key,
            id,
            batch_support: true,
            connected: true,
            reachable: true,
            responds: true,
            cluster_ok: true,
            roll_call_delay: Duration::from_millis(seed as u64 * 10),
            result_delay: Duration::from_millis(5),
            batch_limit: None,
            output: Arc::new(|args| RuntimeOutput {
                stdout: args.join(","),
                ..Default::default()
            }),
        }
    }

    pub fn with_roll_call_delay(mut self, delay: Duration) -> Self {
        self.roll_call_delay = delay;
        self
    }

    pub fn with_result_delay(mut self, delay: Duration) -> Self {
        self.result_delay = delay;
        self
    }

    pub fn with_stdout(mut self, stdout: &str) -> Self {
        let stdout = stdout.to_string();
        self.output = Arc::new(move |_| RuntimeOutput {
            stdout: stdout.clone(),
            ..Default::default()
        });
        self
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.output = Arc::new(move |args| RuntimeOutput {
            stdout: args.join(","),
            exit_code,
            ..Default::default()
        });
        self
    }

    pub fn silent(mut self) -> Self {
        self.responds = false;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn without_batch_support(mut self) -> Self {
        self.batch_support = false;
        self
    }

    pub fn refusing_clusters(mut self) -> Self {
        self.cluster_ok = false;
        self
    }

    pub fn reporting_at_most(mut self, items: usize) -> Self {
        self.batch_limit = Some(items);
        self
    }

    fn run(&self, args: &[String], request_id: &str, timestamp: OffsetDateTime) -> NodeResult {
        let mut result = NodeResult::new(ExecutionResult {
            code: Code::Ok,
            result: (self.output)(args),
            request_id: request_id.to_string(),
            ..Default::default()
        })
        .with_pbft(0, timestamp);
        result.sign(&self.key).expect("sign result");
        result
    }
}

#[derive(Default)]
struct State {
    workers: Vec<Worker>,
    published: Vec<(String, Message)>,
    sent: Vec<(PeerId, Message)>,
    executed: HashMap<PeerId, Vec<Vec<String>>>,
}

pub struct SimHost {
    state: Mutex<State>,
    head: OnceLock<HeadNode>,
}

impl SimHost {
    fn worker(&self, peer: &PeerId) -> Option<Worker> {
        self.state
            .lock()
            .workers
            .iter()
            .find(|w| w.id == *peer)
            .cloned()
    }

    fn deliver(&self, from: PeerId, message: Message, delay: Duration) {
        let Some(head) = self.head.get().cloned() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let bytes = message.to_bytes().expect("encode reply");
            let _ = head.process(from, &bytes).await;
        });
    }

    fn record_execution(&self, peer: PeerId, args: &[String]) {
        self.state
            .lock()
            .executed
            .entry(peer)
            .or_default()
            .push(args.to_vec());
    }
}

#[async_trait]
impl Host for SimHost {
    fn id(&self) -> PeerId {
        HEAD
    }

    fn is_connected(&self, peer: &PeerId) -> bool {
        self.worker(peer).is_some_and(|w| w.connected)
    }

    async fn publish(&self, topic: &str, message: &Message) -> Result<(), HostError> {
        let workers = {
            let mut state = self.state.lock();
            state.published.push((topic.to_string(), message.clone()));
            state.workers.clone()
        };

        if let Message::RollCall(rc) = message {
            for worker in workers {
                if rc.batch && !worker.batch_support {
                    continue;
                }
                let reply = Message::from(rc.response(Code::Accepted));
                self.deliver(worker.id, reply, worker.roll_call_delay);
            }
        }
        Ok(())
    }

    async fn send(&self, peer: &PeerId, message: &Message) -> Result<(), HostError> {
        self.state.lock().sent.push((*peer, message.clone()));

        let Some(worker) = self.worker(peer) else {
            return Ok(());
        };
        if !worker.reachable {
            return Err(HostError::Send {
                peer: *peer,
                reason: "connection refused".into(),
            });
        }

        match message {
            Message::WorkOrder(order) => {
                self.record_execution(worker.id, &order.request.arguments);
                if worker.responds {
                    let result = worker.run(&order.request.arguments, &order.request_id, order.timestamp);
                    let reply = Message::from(WorkOrderResponse {
                        request_id: order.request_id.clone(),
                        result,
                    });
                    self.deliver(worker.id, reply, worker.result_delay);
                }
            }
            Message::WorkOrderBatch(order) => {
                let limit = worker.batch_limit.unwrap_or(order.arguments.len());
                let invocation = function_invocation(&order.template.function_id, &order.template.method);
                let mut results = HashMap::new();

                for args in order.arguments.iter().take(limit) {
                    self.record_execution(worker.id, args);
                    let node_result = worker.run(args, &order.request_id, OffsetDateTime::now_utc());
                    results.insert(
                        order.template.execution_id(args),
                        BatchFunctionResult {
                            node_result,
                            function_invocation: invocation.clone(),
                            arguments: args.clone(),
                        },
                    );
                }

                if worker.responds {
                    let reply = Message::from(WorkOrderBatchResponse {
                        request_id: order.request_id.clone(),
                        chunk_id: order.chunk_id.clone(),
                        results,
                    });
                    self.deliver(worker.id, reply, worker.result_delay);
                }
            }
            Message::FormCluster(req) => {
                let reply = Message::from(FormClusterResponse {
                    request_id: req.request_id.clone(),
                    code: if worker.cluster_ok { Code::Ok } else { Code::Error },
                    consensus: req.consensus,
                });
                self.deliver(worker.id, reply, Duration::from_millis(1));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Head node wired to a set of simulated workers
pub struct Network {
    host: Arc<SimHost>,
    pub head: HeadNode,
    pub store: MemoryBatchStore,
}

pub fn test_config() -> HeadConfig {
    HeadConfig::new()
        .with_roll_call_timeout(Duration::from_millis(300))
        .with_execution_timeout(Duration::from_secs(1))
        .with_cluster_formation_timeout(Duration::from_millis(300))
}

impl Network {
    pub fn new(workers: Vec<Worker>) -> Self {
        Self::with_config(workers, test_config())
    }

    pub fn with_config(workers: Vec<Worker>, config: HeadConfig) -> Self {
        let host = Arc::new(SimHost {
            state: Mutex::new(State {
                workers,
                ..Default::default()
            }),
            head: OnceLock::new(),
        });
        let store = MemoryBatchStore::new();

        let head = HeadNode::builder(host.clone())
            .with_store(Arc::new(store.clone()))
            .with_config(config)
            .build()
            .expect("build head node");
        let _ = host.head.set(head.clone());

        Self { host, head, store }
    }

    pub fn worker_ids(&self) -> Vec<PeerId> {
        self.host.state.lock().workers.iter().map(|w| w.id).collect()
    }

    /// Messages sent directly to `peer`
    pub fn sent_to(&self, peer: &PeerId) -> Vec<Message> {
        self.host
            .state
            .lock()
            .sent
            .iter()
            .filter(|(to, _)| to == peer)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub fn published(&self) -> Vec<(String, Message)> {
        self.host.state.lock().published.clone()
    }

    /// Argument tuples a worker executed, in order
    pub fn executed(&self, peer: &PeerId) -> Vec<Vec<String>> {
        self.host
            .state
            .lock()
            .executed
            .get(peer)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_reachable(&self, peer: &PeerId, reachable: bool) {
        if let Some(worker) = self
            .host
            .state
            .lock()
            .workers
            .iter_mut()
            .find(|w| w.id == *peer)
        {
            worker.reachable = reachable;
        }
    }
}

pub fn arguments(count: usize) -> Vec<Vec<String>> {
    (0..count).map(|i| vec![format!("arg-{}", i)]).collect()
}

//! In-memory worker doubles for supervision tests.
//!
//! [`FakeLauncher`] hands the supervisor duplex pipes instead of a real
//! subprocess and gives the test the other ends as a [`FakeWorker`].

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, duplex};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{LaunchSpec, WorkerChannels, WorkerLauncher, WorkerProcess};
use crate::error::WorkerError;
use crate::protocol::{RpcRequest, RpcResponse, WorkerMethod};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Decides how a freshly launched fake worker behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Launch {
    /// Print the readiness line immediately.
    Ready,
    /// Never print the readiness line.
    Silent,
    /// Fail to spawn.
    Fail,
}

/// Test-side ends of one fake worker.
pub(crate) struct FakeWorker {
    requests: Lines<BufReader<DuplexStream>>,
    output: DuplexStream,
    exit: mpsc::UnboundedSender<Option<i32>>,
    pub(crate) spec: LaunchSpec,
}

impl FakeWorker {
    /// Reads the next request the supervisor sent.
    pub(crate) async fn next_request(&mut self) -> Option<RpcRequest> {
        let line = self.requests.next_line().await.ok()??;
        serde_json::from_str(&line).ok()
    }

    /// Writes a raw line to the supervisor.
    pub(crate) async fn write_raw(&mut self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.output.write_all(&bytes).await.expect("write to supervisor");
    }

    /// Answers request `id` with `result`.
    pub(crate) async fn reply(&mut self, id: u64, result: Value) {
        let line = serde_json::to_string(&RpcResponse::success(id, result)).expect("encode");
        self.write_raw(&line).await;
    }

    /// Makes the process exit with `code`.
    pub(crate) fn exit(&self, code: Option<i32>) {
        self.exit.send(code).expect("process handle alive");
    }

    /// Serves requests in the background using `answer`; `None` leaves a
    /// request unanswered. `shutdown` is always acknowledged and followed by
    /// a clean exit.
    pub(crate) fn serve<F>(mut self, mut answer: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(&RpcRequest) -> Option<Value> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(request) = self.next_request().await {
                if request.method == WorkerMethod::Shutdown.as_str() {
                    self.reply(request.id, Value::Null).await;
                    self.exit(Some(0));
                    return;
                }
                if let Some(result) = answer(&request) {
                    self.reply(request.id, result).await;
                }
            }
        })
    }
}

/// Replies healthy to every health check and with no recommendations to analyses.
pub(crate) fn healthy_answers(request: &RpcRequest) -> Option<Value> {
    match WorkerMethod::parse(&request.method) {
        Some(WorkerMethod::Health) => Some(json!({"healthy": true})),
        Some(WorkerMethod::Analyze) => Some(json!({"recommendations": []})),
        _ => Some(Value::Null),
    }
}

struct FakeProcess {
    exits: mpsc::UnboundedReceiver<Option<i32>>,
    kill: mpsc::UnboundedSender<Option<i32>>,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerProcess for FakeProcess {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.exits.recv().await.flatten())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.kill
            .send(None)
            .map_err(|_| io::Error::other("process gone"))
    }

    fn id(&self) -> Option<u32> {
        None
    }
}

/// Launcher producing [`FakeWorker`]s.
pub(crate) struct FakeLauncher {
    script: Mutex<Vec<Launch>>,
    fallback: Launch,
    workers: mpsc::UnboundedSender<FakeWorker>,
    launch_times: Mutex<Vec<Instant>>,
    kills: Arc<AtomicUsize>,
}

impl FakeLauncher {
    /// Creates a launcher whose launches follow `script`, then `fallback`.
    pub(crate) fn new(
        script: Vec<Launch>,
        fallback: Launch,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<FakeWorker>) {
        let (workers, receiver) = mpsc::unbounded_channel();
        let mut reversed = script;
        reversed.reverse();
        let launcher = Arc::new(Self {
            script: Mutex::new(reversed),
            fallback,
            workers,
            launch_times: Mutex::new(Vec::new()),
            kills: Arc::new(AtomicUsize::new(0)),
        });
        (launcher, receiver)
    }

    /// Creates a launcher whose workers always become ready.
    pub(crate) fn ready() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeWorker>) {
        Self::new(Vec::new(), Launch::Ready)
    }

    pub(crate) fn launches(&self) -> usize {
        self.launch_times.lock().expect("launch log").len()
    }

    pub(crate) fn launch_times(&self) -> Vec<Instant> {
        self.launch_times.lock().expect("launch log").clone()
    }

    pub(crate) fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

impl WorkerLauncher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<WorkerChannels, WorkerError> {
        let behaviour = self
            .script
            .lock()
            .expect("script")
            .pop()
            .unwrap_or(self.fallback);
        self.launch_times.lock().expect("launch log").push(Instant::now());
        if behaviour == Launch::Fail {
            return Err(WorkerError::SpawnFailed {
                package: spec.package.clone(),
                message: String::from("scripted failure"),
                source: None,
            });
        }

        let (supervisor_stdin, worker_stdin) = duplex(PIPE_CAPACITY);
        let (mut worker_stdout, supervisor_stdout) = duplex(PIPE_CAPACITY);
        if behaviour == Launch::Ready {
            // Fits in the pipe buffer, so this never blocks.
            let ready = b"{\"ready\":true}\n";
            write_without_waiting(&mut worker_stdout, ready);
        }
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let process = FakeProcess {
            exits: exit_rx,
            kill: exit_tx.clone(),
            kills: Arc::clone(&self.kills),
        };

        let worker = FakeWorker {
            requests: BufReader::new(worker_stdin).lines(),
            output: worker_stdout,
            exit: exit_tx,
            spec: spec.clone(),
        };
        // Tests that never talk to their workers may drop the receiver.
        if let Err(unclaimed) = self.workers.send(worker) {
            std::mem::forget(unclaimed.0);
        }

        Ok(WorkerChannels {
            stdin: Box::new(supervisor_stdin),
            stdout: Box::new(supervisor_stdout),
            stderr: None,
            process: Box::new(process),
        })
    }
}

/// Writes `bytes` into a duplex pipe with spare capacity without awaiting.
fn write_without_waiting(stream: &mut DuplexStream, bytes: &[u8]) {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::AsyncWrite;

    let waker = std::task::Waker::noop();
    let mut context = Context::from_waker(waker);
    match Pin::new(stream).poll_write(&mut context, bytes) {
        Poll::Ready(Ok(written)) => assert_eq!(written, bytes.len(), "ready line fits"),
        other => panic!("ready line could not be written: {other:?}"),
    }
}

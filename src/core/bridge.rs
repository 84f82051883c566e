//! Request/response bridge between a caller and its background inference
//! worker.
//!
//! One bridge owns exactly one worker task and mediates one outstanding
//! request at a time. Submissions while a request is in flight are rejected
//! with [`BridgeError::AlreadyBusy`]; callers that want every trigger to
//! complete must serialize their own submissions.

use crate::core::traits::PipelineFactory;
use crate::core::worker::{self, InferenceJob, InferenceOutput, InferenceRequest, TaskKind};
use chrono::{DateTime, Utc};
use di::Ref;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BridgeError {
    #[error("bridge has no worker yet, call initialize first")]
    NotInitialized,

    #[error("a request is already in flight")]
    AlreadyBusy,

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("worker replied with an unexpected payload: {0}")]
    MalformedResponse(String),

    #[error("worker is gone, reply channel closed")]
    WorkerGone,
}

/// A successfully completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedInference {
    pub request_id: Uuid,
    pub output: InferenceOutput,
    pub finished_at: DateTime<Utc>,
}

/// Observable bridge state, broadcast to subscribers after every transition.
#[derive(Debug, Clone, Default)]
pub struct BridgeState {
    pub busy: bool,
    pub last: Option<Result<CompletedInference, BridgeError>>,
}

type CompletionHook = Box<dyn Fn(&InferenceOutput) + Send + Sync>;

struct WorkerHandle {
    jobs: mpsc::Sender<InferenceJob>,
    _task: JoinHandle<()>,
}

pub struct InferenceBridge {
    kind: TaskKind,
    factory: Ref<dyn PipelineFactory>,
    worker: Mutex<Option<WorkerHandle>>,
    busy: Arc<AtomicBool>,
    state: watch::Sender<BridgeState>,
    on_complete: Arc<Mutex<Option<CompletionHook>>>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

impl InferenceBridge {
    pub fn new(kind: TaskKind, factory: Ref<dyn PipelineFactory>) -> Self {
        let (state, _) = watch::channel(BridgeState::default());

        Self {
            kind,
            factory,
            worker: Mutex::new(None),
            busy: Arc::new(AtomicBool::new(false)),
            state,
            on_complete: Arc::new(Mutex::new(None)),
            relay: Mutex::new(None),
        }
    }

    /// Spawns the worker task if it does not exist yet. Safe to call any
    /// number of times; only the first call has an effect.
    pub fn initialize(&self) {
        let mut worker = self.worker.lock().unwrap();

        if worker.is_none() {
            let (sender, receiver) = mpsc::channel(10);
            let task = tokio::spawn(worker::background_task(
                self.kind,
                self.factory.clone(),
                receiver,
            ));

            *worker = Some(WorkerHandle {
                jobs: sender,
                _task: task,
            });
        }
    }

    /// Sends `text` to the worker. Does not wait for the result: completion
    /// is observable through [`subscribe`](Self::subscribe) and the optional
    /// completion hook. Returns the id of the accepted request.
    pub fn submit(&self, text: &str) -> Result<Uuid, BridgeError> {
        let jobs = {
            let worker = self.worker.lock().unwrap();
            worker
                .as_ref()
                .map(|w| w.jobs.clone())
                .ok_or(BridgeError::NotInitialized)?
        };

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BridgeError::AlreadyBusy);
        }

        let request = InferenceRequest::new(text);
        let request_id = request.id;
        let (job, reply) = InferenceJob::new(request);

        // Broadcast the busy transition before the job can possibly complete,
        // so the relay's completion update always comes second.
        self.state.send_modify(|s| s.busy = true);

        // Capacity can never be hit: the busy flag admits one job at a time.
        if jobs.try_send(job).is_err() {
            self.busy.store(false, Ordering::SeqCst);
            self.state.send_modify(|s| s.busy = false);
            return Err(BridgeError::WorkerGone);
        }

        debug!("submitted {} request {request_id}", self.kind.as_str());

        let busy = self.busy.clone();
        let state = self.state.clone();
        let on_complete = self.on_complete.clone();

        let relay = tokio::spawn(async move {
            let last = match reply.await {
                Ok((id, Ok(output))) => {
                    if id != request_id {
                        warn!("reply {id} does not match outstanding request {request_id}");
                        Err(BridgeError::MalformedResponse(format!(
                            "reply for unknown request {id}"
                        )))
                    } else {
                        if let Some(hook) = on_complete.lock().unwrap().as_ref() {
                            hook(&output);
                        }
                        Ok(CompletedInference {
                            request_id: id,
                            output,
                            finished_at: Utc::now(),
                        })
                    }
                }
                Ok((_, Err(e))) => Err(e),
                Err(_) => Err(BridgeError::WorkerGone),
            };

            // Publish the completion before readmitting submissions: a
            // submit that wins the busy flag after this store must never
            // find a watch state older than this exchange.
            state.send_modify(|s| {
                s.busy = false;
                s.last = Some(last);
            });
            busy.store(false, Ordering::SeqCst);
        });

        *self.relay.lock().unwrap() = Some(relay);

        Ok(request_id)
    }

    /// Detaches from the worker: in-flight computation keeps running, but no
    /// further state updates happen even if the worker still replies. The
    /// worker task exits once it drains its channel.
    pub fn dispose(&self) {
        if let Some(relay) = self.relay.lock().unwrap().take() {
            relay.abort();
        }

        self.worker.lock().unwrap().take();

        // A disposed bridge can be re-initialized; a request that was still
        // in flight must not wedge it in the busy state.
        self.busy.store(false, Ordering::SeqCst);
        self.state.send_modify(|s| s.busy = false);
    }

    /// One-shot-per-response callback, invoked on success only.
    pub fn set_on_complete(&self, hook: CompletionHook) {
        *self.on_complete.lock().unwrap() = Some(hook);
    }

    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> BridgeState {
        self.state.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

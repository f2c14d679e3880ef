//! Isolated compile worker
//!
//! The compiler runs on its own thread and only talks to the rest of the
//! process through JSON messages on crossbeam channels:
//!
//! - request: `{"id": 1, "grammar": "..."}`
//! - response: `{"id": 1, "parser": "...", "terms": "...", "warnings": []}`
//!   or `{"id": 1, "error": "..."}`
//!
//! A second thread routes responses back to the waiting caller by id. A
//! request that cannot be answered is rejected to its caller whenever its
//! id can be read.

use crate::compiler::{CompileReport, GrammarCompiler};
use crate::error::GrammarError;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, warn};

type ReplySender = oneshot::Sender<Result<CompileReport, GrammarError>>;
type PendingMap = Arc<Mutex<FxHashMap<u64, ReplySender>>>;

/// Pending reply for one submitted grammar.
pub type Reply = oneshot::Receiver<Result<CompileReport, GrammarError>>;

#[derive(Debug, Serialize, Deserialize)]
struct Request {
    id: u64,
    grammar: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Response {
    Compiled {
        id: u64,
        parser: String,
        terms: String,
        warnings: Vec<String>,
    },
    Failed {
        id: u64,
        error: String,
    },
}

/// Run a compiler, turning a panic into an error message.
pub(crate) fn run_compiler(compiler: &dyn GrammarCompiler, grammar: &str) -> Result<CompileReport, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| compiler.compile(grammar))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("Grammar compiler panicked: {}", message))
        }
    }
}

/// Handle to the compile thread.
pub struct Worker {
    requests: Mutex<Option<Sender<String>>>,
    pending: PendingMap,
    next_id: AtomicU64,
    threads: Vec<thread::JoinHandle<()>>,
}

impl Worker {
    /// Start the compile and reply threads.
    pub fn spawn(compiler: Arc<dyn GrammarCompiler>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = channel::unbounded::<String>();
        let (response_tx, response_rx) = channel::unbounded::<String>();
        let pending: PendingMap = Arc::new(Mutex::new(FxHashMap::default()));

        let rejects = pending.clone();
        let compile = thread::Builder::new()
            .name("loom-grammar-worker".to_string())
            .spawn(move || compile_loop(compiler, request_rx, response_tx, rejects))?;

        let routes = pending.clone();
        let reply = thread::Builder::new()
            .name("loom-grammar-replies".to_string())
            .spawn(move || reply_loop(response_rx, routes))?;

        Ok(Self {
            requests: Mutex::new(Some(request_tx)),
            pending,
            next_id: AtomicU64::new(1),
            threads: vec![compile, reply],
        })
    }

    /// Post a grammar to the worker.
    ///
    /// Fails with [`GrammarError::WorkerUnavailable`] when the worker is no
    /// longer accepting requests.
    pub fn submit(&self, grammar: &str) -> Result<Reply, GrammarError> {
        let requests = self.requests.lock().clone().ok_or(GrammarError::WorkerUnavailable)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = serde_json::to_string(&Request {
            id,
            grammar: grammar.to_string(),
        })
        .map_err(|e| GrammarError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        if requests.send(message).is_err() {
            self.pending.lock().remove(&id);
            return Err(GrammarError::WorkerUnavailable);
        }
        debug!(id, "grammar posted to worker");
        Ok(rx)
    }

    /// Stop accepting requests. Callers still waiting see their reply
    /// channel close; later submits fail with
    /// [`GrammarError::WorkerUnavailable`].
    pub fn close(&self) {
        // Closing the request channel ends both loops.
        self.requests.lock().take();
        let abandoned = std::mem::take(&mut *self.pending.lock());
        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "grammar worker closed with requests in flight");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.requests.lock().is_none()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.close();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Id of a message that failed to decode as a whole.
fn message_id(message: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(message).ok()?.get("id")?.as_u64()
}

/// Answer a waiter directly, without a round trip through the reply thread.
fn reject(pending: &PendingMap, message: &str, error: GrammarError) {
    match message_id(message).and_then(|id| pending.lock().remove(&id)) {
        Some(reply) => {
            let _ = reply.send(Err(error));
        }
        None => warn!(error = %error, "dropping worker message without a waiter"),
    }
}

fn compile_loop(
    compiler: Arc<dyn GrammarCompiler>,
    requests: Receiver<String>,
    responses: Sender<String>,
    pending: PendingMap,
) {
    for message in requests.iter() {
        let request: Request = match serde_json::from_str(&message) {
            Ok(request) => request,
            Err(err) => {
                reject(&pending, &message, GrammarError::Protocol(err.to_string()));
                continue;
            }
        };
        let response = match run_compiler(compiler.as_ref(), &request.grammar) {
            Ok(report) => Response::Compiled {
                id: request.id,
                parser: report.parser,
                terms: report.terms,
                warnings: report.warnings,
            },
            Err(error) => Response::Failed { id: request.id, error },
        };
        let encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(err) => {
                if let Some(reply) = pending.lock().remove(&request.id) {
                    let _ = reply.send(Err(GrammarError::Protocol(err.to_string())));
                }
                continue;
            }
        };
        if responses.send(encoded).is_err() {
            break;
        }
    }
}

fn reply_loop(responses: Receiver<String>, pending: PendingMap) {
    for message in responses.iter() {
        let (id, result) = match serde_json::from_str::<Response>(&message) {
            Ok(Response::Compiled {
                id,
                parser,
                terms,
                warnings,
            }) => (
                id,
                Ok(CompileReport {
                    parser,
                    terms,
                    warnings,
                }),
            ),
            Ok(Response::Failed { id, error }) => (id, Err(GrammarError::Compile(error))),
            Err(err) => {
                reject(&pending, &message, GrammarError::Protocol(err.to_string()));
                continue;
            }
        };
        if let Some(reply) = pending.lock().remove(&id) {
            // The caller may have stopped waiting.
            let _ = reply.send(result);
        }
    }
}

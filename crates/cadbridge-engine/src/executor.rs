//! The single execution thread.
//!
//! One dedicated OS thread owns the host. Transports submit calls through a
//! bounded channel; the thread polls it, sleeping for the throttle delay
//! whenever a poll comes back empty, and answers each call on a oneshot.
//! Calls are processed strictly in arrival order. Dropping every
//! [`EngineHandle`] stops the thread and hands the host back through the
//! join handle.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cadbridge_commands::CommandMeta;
use cadbridge_core::errors::TRANSACTION_FAILED;
use cadbridge_core::host::HostDocument;
use cadbridge_guards::{AdaptiveThrottle, SelectionCache};
use cadbridge_settings::ExecutorSettings;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::dispatcher::{Dispatcher, ExecuteCall};
use crate::envelope::ResultEnvelope;
use crate::errors::EngineError;

struct Job {
    call: ExecuteCall,
    enqueued_at: Instant,
    reply: oneshot::Sender<ResultEnvelope>,
}

/// Cloneable submission handle.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Job>,
    dispatcher: Arc<Dispatcher>,
    throttle: Arc<AdaptiveThrottle>,
    timeout: Duration,
}

/// Start the execution thread that owns `host`.
pub fn spawn<H>(
    host: H,
    dispatcher: Arc<Dispatcher>,
    throttle: Arc<AdaptiveThrottle>,
    settings: &ExecutorSettings,
) -> Result<(EngineHandle, JoinHandle<H>), EngineError>
where
    H: HostDocument + 'static,
{
    let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
    let thread = {
        let dispatcher = Arc::clone(&dispatcher);
        let throttle = Arc::clone(&throttle);
        std::thread::Builder::new()
            .name("cadbridge-exec".into())
            .spawn(move || run_loop(host, rx, &dispatcher, &throttle))?
    };
    info!(queue_capacity = settings.queue_capacity, "execution thread started");
    let handle = EngineHandle {
        tx,
        dispatcher,
        throttle,
        timeout: Duration::from_millis(settings.request_timeout_ms),
    };
    Ok((handle, thread))
}

fn run_loop<H: HostDocument>(
    mut host: H,
    mut rx: mpsc::Receiver<Job>,
    dispatcher: &Dispatcher,
    throttle: &AdaptiveThrottle,
) -> H {
    loop {
        match rx.try_recv() {
            Ok(job) => {
                throttle.report_poll(true);
                let queue_wait = job.enqueued_at.elapsed();
                let started = Instant::now();
                let envelope = dispatcher.execute(&mut host, job.call, queue_wait);
                throttle.report_processed(1, started.elapsed());
                if envelope.code == TRANSACTION_FAILED {
                    throttle.report_conflict();
                }
                if job.reply.send(envelope).is_err() {
                    debug!("caller went away before the reply");
                }
                let _ = throttle.adjust();
            }
            Err(TryRecvError::Empty) => {
                throttle.report_poll(false);
                std::thread::sleep(throttle.adjust());
            }
            Err(TryRecvError::Disconnected) => break,
        }
    }
    info!("execution thread stopped");
    host
}

impl EngineHandle {
    /// Submit a call and wait for its envelope.
    ///
    /// Never fails: a stopped thread or a timeout yields an
    /// `ENGINE_UNAVAILABLE` envelope.
    pub async fn execute(&self, call: ExecuteCall) -> ResultEnvelope {
        let method = call.method.clone();
        match self.submit(call).await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(method = %method, error = %e, "call not answered");
                let mut envelope = ResultEnvelope::error(e.code(), e.to_string(), None);
                envelope.context.method = method;
                envelope
            }
        }
    }

    /// Submit a call, surfacing queue failures as errors.
    pub async fn submit(&self, call: ExecuteCall) -> Result<ResultEnvelope, EngineError> {
        let (reply, rx) = oneshot::channel();
        let job = Job {
            call,
            enqueued_at: Instant::now(),
            reply,
        };
        let exchange = async {
            self.tx.send(job).await.map_err(|_| EngineError::Stopped)?;
            rx.await.map_err(|_| EngineError::Stopped)
        };
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_elapsed) => {
                self.throttle.report_timeout();
                Err(EngineError::Timeout {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Every command, built-ins included. Does not touch the host.
    pub fn list_commands(&self) -> Vec<CommandMeta> {
        self.dispatcher.list_commands()
    }

    /// Selection cache for host selection-changed notifications.
    pub fn selection(&self) -> Arc<SelectionCache> {
        self.dispatcher.selection()
    }

    /// Polling throttle, for mode changes and diagnostics.
    pub fn throttle(&self) -> &AdaptiveThrottle {
        &self.throttle
    }
}

//! Background compositing with cancel-and-replace.
//!
//! One worker thread per session. Submitting a request supersedes every
//! request submitted before it: queued ones are answered with
//! [`CompositeError::Cancelled`] without running, and a running one stops at
//! its next stage boundary.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tracing::{debug, error, warn};

use crate::cancel::{CancelSource, CancelToken};
use crate::collection::OverlayCollection;
use crate::compositor::{CompositeResult, Compositor};
use crate::error::CompositeError;
use crate::source::BaseImage;

type Reply = Result<CompositeResult, CompositeError>;

/// Everything a render needs, captured by value when the request is made.
#[derive(Debug, Clone)]
pub struct CompositeRequest {
    pub base: BaseImage,
    pub overlays: OverlayCollection,
    pub width: u32,
    pub height: u32,
}

struct Job {
    request: CompositeRequest,
    cancel: CancelToken,
    reply: mpsc::SyncSender<Reply>,
}

/// Handle to one submitted request.
pub struct CompositeTicket {
    generation: u64,
    receiver: mpsc::Receiver<Reply>,
}

impl CompositeTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Blocks until the worker answers.
    pub fn wait(self) -> Reply {
        self.receiver.recv().unwrap_or(Err(CompositeError::Cancelled))
    }

    /// Non-blocking poll. `None` while the request is still running.
    pub fn try_wait(&self) -> Option<Reply> {
        match self.receiver.try_recv() {
            Ok(reply) => Some(reply),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(CompositeError::Cancelled)),
        }
    }
}

pub struct CompositeWorker {
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    cancel: CancelSource,
}

impl CompositeWorker {
    pub fn spawn(compositor: Compositor) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name("memetrue-compositor".to_owned())
            .spawn(move || run(compositor, receiver))
            .context("failed to spawn compositing thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            cancel: CancelSource::new(),
        })
    }

    /// Queues `request`, cancelling anything submitted earlier.
    pub fn submit(&self, request: CompositeRequest) -> CompositeTicket {
        let cancel = self.cancel.issue();
        let generation = cancel.generation();
        let (reply, receiver) = mpsc::sync_channel(1);

        let job = Job {
            request,
            cancel,
            reply,
        };
        match &self.sender {
            Some(sender) => {
                if let Err(mpsc::SendError(job)) = sender.send(job) {
                    warn!("compositing thread is gone; cancelling request");
                    let _ = job.reply.send(Err(CompositeError::Cancelled));
                }
            }
            None => {
                let _ = job.reply.send(Err(CompositeError::Cancelled));
            }
        }

        CompositeTicket {
            generation,
            receiver,
        }
    }

    /// Cancels every outstanding request without submitting a new one.
    pub fn cancel_pending(&self) {
        self.cancel.cancel_all();
    }
}

impl Drop for CompositeWorker {
    fn drop(&mut self) {
        self.cancel.cancel_all();
        drop(self.sender.take());
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("compositing thread panicked");
            }
        }
    }
}

fn run(compositor: Compositor, receiver: mpsc::Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        let reply = if job.cancel.is_cancelled() {
            Err(CompositeError::Cancelled)
        } else {
            render_job(&compositor, &job)
        };
        if let Err(CompositeError::Cancelled) = &reply {
            debug!(generation = job.cancel.generation(), "composite superseded");
        }
        // The ticket may have been dropped; nobody is waiting then.
        let _ = job.reply.send(reply);
    }
}

/// Runs one job. A panic in the rasterizer or resolver fails only this job.
fn render_job(compositor: &Compositor, job: &Job) -> Reply {
    let request = &job.request;
    panic::catch_unwind(AssertUnwindSafe(|| {
        compositor.composite_with(
            &request.base,
            request.overlays.as_slice(),
            request.width,
            request.height,
            &job.cancel,
        )
    }))
    .unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        error!(generation = job.cancel.generation(), "composite panicked: {message}");
        Err(CompositeError::Internal(message))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

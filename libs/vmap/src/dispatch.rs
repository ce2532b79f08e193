//! Pool of decode workers fed by a bounded FIFO channel.
//!
//! Each worker owns nothing but its end of the channel: it pulls the next job,
//! decodes it and replies on the job's own channel. A failed decode only reaches
//! that job's waiter. With zero workers, `submit` decodes on the caller's thread.

use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::codec;
use crate::error::{Error, FormatError};
use crate::tile::Tile;

struct DecodeJob {
    bytes: Vec<u8>,
    reply: flume::Sender<Result<Tile, FormatError>>,
}

pub struct DecodeDispatcher {
    tx: Option<flume::Sender<DecodeJob>>,
    workers: Vec<JoinHandle<()>>,
}

/// Handle to the eventual result of a [`DecodeDispatcher::submit`].
#[must_use]
pub struct DecodeTicket {
    inner: TicketInner,
}

enum TicketInner {
    Ready(Result<Tile, FormatError>),
    Pending(flume::Receiver<Result<Tile, FormatError>>),
}

impl DecodeTicket {
    /// Whether `wait` would return without blocking.
    pub fn is_ready(&self) -> bool {
        match &self.inner {
            TicketInner::Ready(_) => true,
            TicketInner::Pending(rx) => !rx.is_empty() || rx.is_disconnected(),
        }
    }

    /// Block until the decode finishes.
    pub fn wait(self) -> Result<Tile, Error> {
        match self.inner {
            TicketInner::Ready(res) => Ok(res?),
            TicketInner::Pending(rx) => match rx.recv() {
                Ok(res) => Ok(res?),
                Err(flume::RecvError::Disconnected) => {
                    warn!("decode worker dropped a job without replying");
                    Err(Error::DecodeWorkerLost)
                }
            },
        }
    }
}

impl DecodeDispatcher {
    /// Start `worker_count` workers sharing a queue of `queue_capacity` jobs.
    ///
    /// Workers that fail to spawn are logged and skipped; if none start, the
    /// dispatcher decodes inline.
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        if worker_count == 0 {
            info!("decode pool disabled, decoding inline");
            return Self::inline();
        }
        let (tx, rx) = flume::bounded::<DecodeJob>(queue_capacity.max(1));
        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx = rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("vmap-decode-{i}"))
                .spawn(move || worker_loop(i, rx));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => warn!(worker = i, ?err, "failed to spawn decode worker"),
            }
        }
        if workers.is_empty() {
            warn!("no decode workers started, decoding inline");
            return Self::inline();
        }
        info!(workers = workers.len(), queue_capacity, "decode pool started");
        Self {
            tx: Some(tx),
            workers,
        }
    }

    pub fn inline() -> Self {
        Self {
            tx: None,
            workers: vec![],
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue `bytes` for decoding. Blocks while the queue is full.
    pub fn submit(&self, bytes: Vec<u8>) -> DecodeTicket {
        let Some(tx) = &self.tx else {
            return DecodeTicket {
                inner: TicketInner::Ready(codec::decode(&bytes)),
            };
        };
        let (reply, rx) = flume::bounded(1);
        match tx.send(DecodeJob { bytes, reply }) {
            Ok(()) => DecodeTicket {
                inner: TicketInner::Pending(rx),
            },
            // every worker is gone; keep serving on the caller's thread
            Err(flume::SendError(job)) => {
                warn!("decode queue closed, decoding inline");
                DecodeTicket {
                    inner: TicketInner::Ready(codec::decode(&job.bytes)),
                }
            }
        }
    }

    /// Close the queue, let workers drain what is already queued, and join them.
    pub fn shutdown(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        drop(tx);
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("decode worker panicked");
            }
        }
        debug!("decode pool stopped");
    }
}

impl Drop for DecodeDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, rx: flume::Receiver<DecodeJob>) {
    while let Ok(DecodeJob { bytes, reply }) = rx.recv() {
        let res = codec::decode(&bytes);
        if let Err(err) = &res {
            debug!(worker = id, %err, "decode failed");
        }
        // the waiter may have given up; the pool keeps going either way
        let _ = reply.send(res);
    }
}

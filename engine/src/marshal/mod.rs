//! Action Marshal
//!
//! Single-slot handoff that lets worker threads (speech capture, model calls,
//! input listeners) ask the presentation thread to run an operation for them.
//!
//! The slot is a one-permit semaphore. A submitter takes the permit, which
//! blocks while another action is pending or running, and hands the action
//! together with the permit to the executor. The executor runs the action to
//! completion and only then drops the permit, freeing the slot for the next
//! submitter. At any instant at most one action is pending or running, and
//! every accepted action runs exactly once.
//!
//! There is no fairness between submitters racing for the slot: whoever gets
//! the permit first wins.
//!
//! ```no_run
//! use spassit_engine::marshal;
//!
//! let (marshal, mut executor) = marshal::channel();
//!
//! std::thread::spawn(move || {
//!     marshal
//!         .submit(|| {
//!             println!("running on the presentation thread");
//!             Ok(())
//!         })
//!         .ok();
//! });
//!
//! while let Some(result) = executor.run_next_blocking() {
//!     if let Err(e) = result {
//!         eprintln!("action failed: {}", e);
//!     }
//! }
//! ```

use sdk::errors::EngineError;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, warn};

/// A zero-argument operation to run on the presentation thread
pub type Action = Box<dyn FnOnce() -> Result<(), EngineError> + Send + 'static>;

/// An accepted action, still holding the slot
struct Pending {
    action: Action,
    slot: OwnedSemaphorePermit,
}

impl Pending {
    fn execute(self) -> Result<(), EngineError> {
        let Pending { action, slot } = self;
        let result = action();
        drop(slot);
        result
    }
}

/// Create a connected marshal/executor pair
pub fn channel() -> (ActionMarshal, MarshalExecutor) {
    let slot = Arc::new(Semaphore::new(1));
    let (tx, rx) = mpsc::channel(1);
    (
        ActionMarshal {
            slot: Arc::clone(&slot),
            tx,
        },
        MarshalExecutor { slot, rx },
    )
}

/// Producer side, cheap to clone and hand to any worker
#[derive(Clone)]
pub struct ActionMarshal {
    slot: Arc<Semaphore>,
    tx: mpsc::Sender<Pending>,
}

impl ActionMarshal {
    /// Block until the slot is free, then place `action` in it.
    ///
    /// Meant for plain threads. Async code uses [`submit_async`](Self::submit_async).
    /// Calling this from the presentation thread itself deadlocks once the
    /// slot is taken.
    pub fn submit<F>(&self, action: F) -> Result<(), EngineError>
    where
        F: FnOnce() -> Result<(), EngineError> + Send + 'static,
    {
        let slot = futures::executor::block_on(Arc::clone(&self.slot).acquire_owned())
            .map_err(|_| EngineError::MarshalClosed)?;

        self.tx
            .blocking_send(Pending {
                action: Box::new(action),
                slot,
            })
            .map_err(|_| EngineError::MarshalClosed)
    }

    /// Wait for the slot without blocking the runtime, then place `action` in it
    pub async fn submit_async<F>(&self, action: F) -> Result<(), EngineError>
    where
        F: FnOnce() -> Result<(), EngineError> + Send + 'static,
    {
        let slot = Arc::clone(&self.slot)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::MarshalClosed)?;

        self.tx
            .send(Pending {
                action: Box::new(action),
                slot,
            })
            .await
            .map_err(|_| EngineError::MarshalClosed)
    }

    /// Submit `f` and wait for its result.
    ///
    /// The result goes to the awaiting caller instead of the executor; the
    /// executor only sees a failure if the caller stopped waiting.
    pub async fn run<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce() -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit_async(move || match tx.send(f()) {
            Ok(()) => Ok(()),
            Err(Err(e)) => Err(e),
            Err(Ok(_)) => {
                warn!("Marshalled result discarded, caller stopped waiting");
                Ok(())
            }
        })
        .await?;

        rx.await.map_err(|_| EngineError::MarshalClosed)?
    }

    /// Whether an action currently occupies the slot
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

/// Consumer side, owned by the presentation thread
pub struct MarshalExecutor {
    slot: Arc<Semaphore>,
    rx: mpsc::Receiver<Pending>,
}

impl MarshalExecutor {
    /// Run the pending action if the slot is filled.
    ///
    /// Returns `None` when there is nothing to do.
    pub fn try_run_next(&mut self) -> Option<Result<(), EngineError>> {
        self.rx.try_recv().ok().map(Pending::execute)
    }

    /// Block until an action arrives and run it.
    ///
    /// Returns `None` once every marshal has been dropped.
    pub fn run_next_blocking(&mut self) -> Option<Result<(), EngineError>> {
        self.rx.blocking_recv().map(Pending::execute)
    }

    /// Wait for an action and run it on the current thread
    pub async fn run_next(&mut self) -> Option<Result<(), EngineError>> {
        self.rx.recv().await.map(Pending::execute)
    }

    /// Serve actions until every marshal is gone, logging failures
    pub fn run_blocking(mut self) {
        while let Some(result) = self.run_next_blocking() {
            if let Err(e) = result {
                error!("Marshalled action failed: {}", e);
            }
        }
        debug!("Action marshal drained, executor stopping");
    }
}

impl Drop for MarshalExecutor {
    fn drop(&mut self) {
        // Refuse new submitters, then honour what was already accepted.
        self.slot.close();
        self.rx.close();
        while let Ok(pending) = self.rx.try_recv() {
            if let Err(e) = pending.execute() {
                error!("Marshalled action failed during shutdown: {}", e);
            }
        }
    }
}

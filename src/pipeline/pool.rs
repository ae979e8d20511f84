//! Fixed-size worker pool: one dedicated OS thread per slot.
//!
//! ## Slot accounting
//!
//! The slot table (free list + per-slot busy flag) is the only shared mutable
//! state and lives behind a mutex. A tokio [`Semaphore`] with one permit per
//! slot provides the wait: `submit` first awaits a permit, then claims a free
//! slot under the lock. A finishing job marks its slot free *before* its permit
//! is returned, so whoever wakes on that permit always finds a free slot.
//!
//! Slots are reused LIFO. Completion order across jobs is arbitrary.
//!
//! ## Isolation
//!
//! Each job is an owned `FnOnce` moved onto its slot's thread; jobs share
//! nothing with each other. A panicking job is caught, its slot freed and the
//! panic reported through its [`JobHandle`], so every accepted job completes
//! exactly once.

use crate::error::CompressError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Why a submitted job produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("job panicked on worker #{slot}: {message}")]
    Panicked { slot: usize, message: String },

    #[error("worker #{slot} exited before reporting a result")]
    Lost { slot: usize },
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub capacity: usize,
    pub busy: usize,
    /// Highest number of simultaneously busy slots since creation.
    pub peak_busy: usize,
    pub completed: u64,
}

#[derive(Debug)]
struct SlotTable {
    free: Vec<usize>,
    busy: Vec<bool>,
    peak_busy: usize,
    completed: u64,
}

impl SlotTable {
    fn new(capacity: usize) -> Self {
        Self {
            // Reversed so the first claim takes slot 0.
            free: (0..capacity).rev().collect(),
            busy: vec![false; capacity],
            peak_busy: 0,
            completed: 0,
        }
    }

    fn busy_count(&self) -> usize {
        self.busy.len() - self.free.len()
    }

    /// free → busy
    fn claim(&mut self) -> Option<usize> {
        let slot = self.free.pop()?;
        debug_assert!(!self.busy[slot], "slot #{slot} handed out twice");
        self.busy[slot] = true;
        self.peak_busy = self.peak_busy.max(self.busy_count());
        Some(slot)
    }

    /// busy → free
    fn release(&mut self, slot: usize, finished: bool) {
        if !self.busy[slot] {
            return;
        }
        self.busy[slot] = false;
        self.free.push(slot);
        if finished {
            self.completed += 1;
        }
    }
}

struct Slot {
    sender: Option<mpsc::Sender<Task>>,
    thread: Option<JoinHandle<()>>,
}

/// Pool of `capacity` isolated execution slots.
pub struct WorkerPool {
    slots: Vec<Slot>,
    table: Arc<Mutex<SlotTable>>,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    /// Start `capacity` worker threads (at least one).
    pub fn new(capacity: usize) -> Result<Self, CompressError> {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);

        for id in 0..capacity {
            let (tx, rx) = mpsc::channel::<Task>();
            let thread = thread::Builder::new()
                .name(format!("cyoa-worker-{id}"))
                .spawn(move || {
                    for task in rx {
                        task();
                    }
                    trace!("Worker #{} exiting", id);
                })
                .map_err(|source| CompressError::WorkerSpawnFailed { slot: id, source })?;
            slots.push(Slot {
                sender: Some(tx),
                thread: Some(thread),
            });
        }

        debug!("Worker pool started with {} slots", capacity);
        Ok(Self {
            slots,
            table: Arc::new(Mutex::new(SlotTable::new(capacity))),
            permits: Arc::new(Semaphore::new(capacity)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> PoolStats {
        let table = lock(&self.table);
        PoolStats {
            capacity: self.slots.len(),
            busy: table.busy_count(),
            peak_busy: table.peak_busy,
            completed: table.completed,
        }
    }

    /// Ids of the currently free slots.
    pub fn free_slots(&self) -> Vec<usize> {
        lock(&self.table).free.clone()
    }

    /// Run `job` on the next free slot, waiting while every slot is busy.
    ///
    /// Returns once the job has been handed to a slot; await the handle for
    /// its result.
    pub async fn submit<F, T>(&self, job: F) -> Result<JobHandle<T>, CompressError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| CompressError::PoolClosed)?;

        let slot = lock(&self.table).claim().ok_or_else(|| {
            CompressError::Internal("permit granted but no free slot".to_string())
        })?;
        debug!("Job accepted by worker #{}", slot);

        let (tx, rx) = oneshot::channel();
        let task = wrap_job(slot, job, Arc::clone(&self.table), permit, tx);

        let sender = self.slots[slot]
            .sender
            .as_ref()
            .ok_or(CompressError::PoolClosed)?;
        if let Err(mpsc::SendError(task)) = sender.send(task) {
            // Worker thread is gone: undo the claim and drop the permit with the task.
            lock(&self.table).release(slot, false);
            drop(task);
            return Err(CompressError::PoolClosed);
        }

        Ok(JobHandle { slot, rx })
    }
}

fn wrap_job<F, T>(
    slot: usize,
    job: F,
    table: Arc<Mutex<SlotTable>>,
    permit: OwnedSemaphorePermit,
    tx: oneshot::Sender<Result<T, JobError>>,
) -> Task
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Box::new(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(job)).map_err(|payload| {
            JobError::Panicked {
                slot,
                message: panic_message(payload.as_ref()),
            }
        });
        lock(&table).release(slot, true);
        drop(permit);
        debug!("Worker #{} free", slot);
        // The receiver may have given up (timeout); the result is simply dropped.
        let _ = tx.send(outcome);
    })
}

/// Closing the pool never waits on a running job.
///
/// Idle workers are joined. A busy worker (for example one whose job outlived
/// its timeout) is detached: its sender is gone, so the thread exits on its own
/// once the current job returns, and that result is discarded.
impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.permits.close();
        for slot in &mut self.slots {
            slot.sender.take();
        }
        let busy = lock(&self.table).busy.clone();
        for (id, slot) in self.slots.iter_mut().enumerate() {
            let Some(handle) = slot.thread.take() else {
                continue;
            };
            if busy[id] {
                debug!("Worker #{} still running, detaching", id);
            } else {
                let _ = handle.join();
            }
        }
    }
}

/// Pending result of a submitted job.
#[derive(Debug)]
pub struct JobHandle<T> {
    slot: usize,
    rx: oneshot::Receiver<Result<T, JobError>>,
}

impl<T> JobHandle<T> {
    /// Slot the job was assigned to.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Wait for the job to finish.
    pub async fn join(self) -> Result<T, JobError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(JobError::Lost { slot: self.slot }),
        }
    }
}

fn lock(table: &Mutex<SlotTable>) -> MutexGuard<'_, SlotTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

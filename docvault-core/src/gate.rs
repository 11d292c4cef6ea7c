//! FIFO call serialization.
//!
//! A [`SerializationGate`] admits one holder at a time. Work that arrives while the gate is
//! held waits in arrival order, and the gate is handed directly from one holder to the next.
//!
//! Async holders get a [`GateGuard`] that releases the gate when dropped, so a cancelled or
//! panicking holder never leaves it busy. Tasks queued with [`SerializationGate::lock_with`]
//! release it explicitly with [`SerializationGate::unlock`].

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use futures::channel::oneshot;

enum Waiter {
    Task(Box<dyn FnOnce() + Send>),
    Signal(oneshot::Sender<()>),
}

#[derive(Default)]
struct GateState {
    busy: bool,
    waiters: VecDeque<Waiter>,
}

/// FIFO gate usable across `.await`.
///
/// # Example
///
/// ```ignore
/// use docvault_core::gate::SerializationGate;
///
/// let gate = SerializationGate::new();
///
/// let guard = gate.lock().await;
/// let next = counter + 1;   // read-modify-write across awaits
/// store(next).await;
/// drop(guard);
/// ```
#[derive(Default)]
pub struct SerializationGate {
    state: Mutex<GateState>,
}

impl SerializationGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Runs `task` now if the gate is free, otherwise queues it behind the current holder.
    ///
    /// The task holds the gate when it runs and must call [`unlock`](Self::unlock) itself.
    pub fn lock_with<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.state();
            if state.busy {
                state.waiters.push_back(Waiter::Task(Box::new(task)));
                return;
            }
            state.busy = true;
        }

        task();
    }

    /// Waits until the caller holds the gate.
    ///
    /// The gate is released when the returned guard is dropped. Dropping the future while it
    /// waits gives up its place in the queue, and passes the gate on if it was already handed
    /// over.
    pub async fn lock(&self) -> GateGuard<'_> {
        let receiver = {
            let mut state = self.state();
            if !state.busy {
                state.busy = true;
                return GateGuard { gate: self };
            }

            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(Waiter::Signal(sender));
            receiver
        };

        let mut waiting = Waiting { gate: self, receiver, admitted: false };
        // the sender is only dropped without a signal when the gate itself is dropped
        let _ = (&mut waiting.receiver).await;
        waiting.admitted = true;
        GateGuard { gate: self }
    }

    /// Hands the gate to the next waiter, or marks it free when nobody is waiting.
    pub fn unlock(&self) {
        loop {
            let next = {
                let mut state = self.state();
                match state.waiters.pop_front() {
                    Some(next) => next,
                    None => {
                        state.busy = false;
                        return;
                    }
                }
            };

            match next {
                Waiter::Task(task) => {
                    task();
                    return;
                }
                Waiter::Signal(sender) => {
                    // a waiter that gave up is skipped
                    if sender.send(()).is_ok() {
                        return;
                    }
                }
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state().busy
    }

    /// Number of queued waiters.
    pub fn pending(&self) -> usize {
        self.state().waiters.len()
    }
}

/// Holds a [`SerializationGate`] until dropped.
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    gate: &'a SerializationGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.unlock();
    }
}

impl std::fmt::Debug for GateGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateGuard").finish_non_exhaustive()
    }
}

/// A queued [`SerializationGate::lock`] call.
struct Waiting<'a> {
    gate: &'a SerializationGate,
    receiver: oneshot::Receiver<()>,
    admitted: bool,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }

        // after `close` a later `unlock` skips this waiter, so the only signal left to
        // observe is one sent before
        self.receiver.close();
        if let Ok(Some(())) = self.receiver.try_recv() {
            self.gate.unlock();
        }
    }
}

impl std::fmt::Debug for SerializationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SerializationGate")
            .field("busy", &state.busy)
            .field("pending", &state.waiters.len())
            .finish()
    }
}

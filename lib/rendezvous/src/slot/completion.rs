// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use futures::task::AtomicWaker;
use parking_lot::Mutex;
use std::fmt;
use std::task::{Context, Poll};

use crate::error::{RendezvousError, Result};

/// Observable state of a [`Completion`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CompletionStatus {
    Pending,
    Resolved,
    Failed,
    /// The outcome was handed to its consumer.
    Taken,
}

impl CompletionStatus {
    /// Anything but `Pending`.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

enum CompletionState<V> {
    Pending,
    Resolved(V),
    Failed(RendezvousError),
    Taken,
}

impl<V> CompletionState<V> {
    fn status(&self) -> CompletionStatus {
        match self {
            Self::Pending => CompletionStatus::Pending,
            Self::Resolved(_) => CompletionStatus::Resolved,
            Self::Failed(_) => CompletionStatus::Failed,
            Self::Taken => CompletionStatus::Taken,
        }
    }
}

/// Single-assignment result slot shared by one producer and one consumer.
///
/// The slot leaves `Pending` exactly once, either with a value or with an
/// error. Later attempts are rejected: [`resolve`](Self::resolve) hands the
/// value back and [`fail`](Self::fail) returns `false`.
pub struct Completion<V> {
    waker: AtomicWaker,
    state: Mutex<CompletionState<V>>,
}

impl<V> Completion<V> {
    pub(crate) fn pending() -> Self {
        Self {
            waker: AtomicWaker::new(),
            state: Mutex::new(CompletionState::Pending),
        }
    }

    pub(crate) fn resolved(value: V) -> Self {
        Self {
            waker: AtomicWaker::new(),
            state: Mutex::new(CompletionState::Resolved(value)),
        }
    }

    /// Complete the slot with a value.
    ///
    /// Returns the value back if the slot was already final.
    pub fn resolve(&self, value: V) -> std::result::Result<(), V> {
        let mut state = self.state.lock();
        if !matches!(*state, CompletionState::Pending) {
            return Err(value);
        }
        *state = CompletionState::Resolved(value);
        drop(state);
        self.waker.wake();
        Ok(())
    }

    /// Complete the slot with an error.
    ///
    /// Returns `false` if the slot was already final.
    pub fn fail(&self, err: RendezvousError) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, CompletionState::Pending) {
            return false;
        }
        *state = CompletionState::Failed(err);
        drop(state);
        self.waker.wake();
        true
    }

    /// Current status of the slot.
    pub fn status(&self) -> CompletionStatus {
        self.state.lock().status()
    }

    /// Returns `true` while nobody has resolved or failed the slot.
    pub fn is_pending(&self) -> bool {
        matches!(*self.state.lock(), CompletionState::Pending)
    }

    /// Move a resolved value out, leaving the slot `Taken`.
    ///
    /// Pending, failed and taken slots are left untouched.
    pub(crate) fn take_value(&self) -> Option<V> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, CompletionState::Taken) {
            CompletionState::Resolved(value) => Some(value),
            other => {
                *state = other;
                None
            }
        }
    }

    /// Move a final outcome out without waiting.
    ///
    /// `None` when the slot is still pending or was already taken.
    pub(crate) fn try_take(&self) -> Option<Result<V>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, CompletionState::Taken) {
            CompletionState::Resolved(value) => Some(Ok(value)),
            CompletionState::Failed(err) => Some(Err(err)),
            other => {
                *state = other;
                None
            }
        }
    }

    /// Poll for the outcome, registering the waker first so a completion that
    /// lands between the check and the return is never lost.
    ///
    /// `Ready(None)` means the outcome was already handed out.
    pub(crate) fn poll_take(&self, cx: &mut Context<'_>) -> Poll<Option<Result<V>>> {
        self.waker.register(cx.waker());

        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, CompletionState::Taken) {
            CompletionState::Pending => {
                *state = CompletionState::Pending;
                Poll::Pending
            }
            CompletionState::Resolved(value) => Poll::Ready(Some(Ok(value))),
            CompletionState::Failed(err) => Poll::Ready(Some(Err(err))),
            CompletionState::Taken => Poll::Ready(None),
        }
    }

    /// Wait for the outcome and take it.
    pub(crate) async fn wait(&self) -> Option<Result<V>> {
        std::future::poll_fn(|cx| self.poll_take(cx)).await
    }
}

impl<V> fmt::Debug for Completion<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("status", &self.status())
            .finish()
    }
}

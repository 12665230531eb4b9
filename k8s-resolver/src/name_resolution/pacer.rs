/*
 *
 * Copyright 2025 gRPC authors.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to
 * deal in the Software without restriction, including without limitation the
 * rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
 * sell copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
 * FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
 * IN THE SOFTWARE.
 *
 */

//! Pacing of resolver notifications.
//!
//! A channel that cannot connect calls `resolve_now` as fast as the resolver
//! answers. Both resolvers route those requests through a [`Pacer`] so that a
//! burst of requests turns into at most one notification per interval.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::rt::{Runtime, TaskHandle};

/// Emits at most one notification per `min_interval`, coalescing requests
/// that arrive while a notification is already scheduled.
#[derive(Clone)]
pub(crate) struct Pacer {
    inner: Arc<Inner>,
}

struct Inner {
    min_interval: Duration,
    runtime: Arc<dyn Runtime>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    last_fired: Option<Instant>,
    pending: Option<Box<dyn TaskHandle>>,
    // Bumped whenever the pending timer is replaced or cancelled, so a timer
    // that already woke up can tell it is stale.
    generation: u64,
}

impl Pacer {
    pub(crate) fn new(min_interval: Duration, runtime: Arc<dyn Runtime>) -> Self {
        Pacer {
            inner: Arc::new(Inner {
                min_interval,
                runtime,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Arranges for `fire` to run once the interval since the last
    /// notification has elapsed. Returns false if a notification was already
    /// pending, in which case `fire` is dropped.
    pub(crate) fn schedule<F>(&self, fire: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.pending.is_some() {
            return false;
        }
        let delay = match state.last_fired {
            Some(last) => self.inner.min_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        };
        state.generation += 1;
        let generation = state.generation;
        let inner = self.inner.clone();
        let sleep = self.inner.runtime.sleep(delay);
        let handle = self.inner.runtime.spawn(Box::pin(async move {
            sleep.await;
            {
                let mut state = inner.state.lock();
                if state.generation != generation {
                    return;
                }
                state.pending = None;
                state.last_fired = Some(Instant::now());
            }
            fire();
        }));
        state.pending = Some(handle);
        true
    }

    /// Drops the pending notification, if any.
    pub(crate) fn cancel(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
    }

    /// Records a notification that bypassed the pacer.
    pub(crate) fn mark_fired(&self) {
        self.inner.state.lock().last_fired = Some(Instant::now());
    }

    /// Cancels any pending notification and forgets the last one.
    pub(crate) fn reset(&self) {
        self.cancel();
        self.inner.state.lock().last_fired = None;
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }
}

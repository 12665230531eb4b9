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

//! Fakes of the channel side of the resolver contract.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{ChannelController, ResolverOptions, ResolverUpdate, WorkScheduler};
use crate::{options::ChannelOptions, rt};

pub(crate) struct FakeWorkScheduler {
    work_tx: UnboundedSender<()>,
}

impl WorkScheduler for FakeWorkScheduler {
    fn schedule_work(&self) {
        let _ = self.work_tx.send(());
    }
}

pub(crate) struct FakeChannelController {
    update_result: Result<(), String>,
    update_tx: UnboundedSender<ResolverUpdate>,
}

impl ChannelController for FakeChannelController {
    fn update(&mut self, update: ResolverUpdate) -> Result<(), String> {
        println!("Received resolver update: {:?}", &update);
        self.update_tx.send(update).unwrap();
        self.update_result.clone()
    }
}

/// Returns resolver options wired to a fake work scheduler, and the receiver
/// of its `schedule_work` calls.
pub(crate) fn resolver_options(
    channel_options: ChannelOptions,
) -> (ResolverOptions, UnboundedReceiver<()>) {
    let (work_tx, work_rx) = mpsc::unbounded_channel();
    let options = ResolverOptions {
        runtime: rt::default_runtime(),
        work_scheduler: Arc::new(FakeWorkScheduler { work_tx }),
        channel_options,
    };
    (options, work_rx)
}

pub(crate) fn channel_controller() -> (FakeChannelController, UnboundedReceiver<ResolverUpdate>) {
    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let controller = FakeChannelController {
        update_result: Ok(()),
        update_tx,
    };
    (controller, update_rx)
}

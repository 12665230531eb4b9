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

//! A resolver for authorities with statically configured addresses.
//!
//! `fixed:///svc-a` resolves through the `gww.fixed.authority_map` channel
//! option. Unknown authorities and malformed entries still resolve, falling
//! back to `127.0.0.1:443`.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::{debug, warn};

use super::{
    Address, ChannelController, Endpoint, Resolver, ResolverBuilder, ResolverOptions,
    ResolverUpdate, Target, WorkScheduler, pacer::Pacer,
};


const SCHEME: &str = "fixed";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 443;

/// Builds resolvers for the `fixed` scheme.
#[derive(Debug, Default)]
pub struct FixedResolverBuilder {
    _priv: (),
}

impl FixedResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResolverBuilder for FixedResolverBuilder {
    fn build(&self, target: &Target, options: ResolverOptions) -> Box<dyn Resolver> {
        let authority = self.default_authority(target);
        let channel_options = &options.channel_options;
        let pacer = Pacer::new(
            channel_options.min_time_between_resolutions(),
            options.runtime.clone(),
        );
        Box::new(FixedResolver {
            authority_map: channel_options.authority_map(),
            authority,
            work_scheduler: options.work_scheduler,
            pacer,
            resolution_pending: Arc::default(),
        })
    }

    fn scheme(&self) -> &str {
        SCHEME
    }
}

struct FixedResolver {
    authority: String,
    authority_map: HashMap<String, String>,
    work_scheduler: Arc<dyn WorkScheduler>,
    pacer: Pacer,
    resolution_pending: Arc<AtomicBool>,
}

impl Resolver for FixedResolver {
    fn resolve_now(&mut self) {
        let pending = self.resolution_pending.clone();
        let work_scheduler = self.work_scheduler.clone();
        self.pacer.schedule(move || {
            pending.store(true, Ordering::Release);
            work_scheduler.schedule_work();
        });
    }

    fn work(&mut self, channel_controller: &mut dyn ChannelController) {
        if !self.resolution_pending.swap(false, Ordering::AcqRel) {
            return;
        }
        let host_port = self.authority_map.get(&self.authority);
        let address = parse_host_port(host_port.map(String::as_str));
        debug!(authority = %self.authority, %address, "mapped fixed authority");
        let resolution_note = host_port
            .is_none()
            .then(|| format!("no mapping for {}, using {address}", self.authority));
        let update = ResolverUpdate {
            endpoints: Ok(vec![Endpoint::single(address)]),
            resolution_note,
            ..Default::default()
        };
        if let Err(err) = channel_controller.update(update) {
            warn!(authority = %self.authority, error = %err, "channel rejected fixed resolution");
        }
    }
}

impl Drop for FixedResolver {
    fn drop(&mut self) {
        self.pacer.reset();
    }
}

/// Splits a `host:port` mapping. The host is the text before the first `:`
/// and the port the text after it; either falls back to its default when
/// missing or unusable.
fn parse_host_port(host_port: Option<&str>) -> Address {
    let mut parts = host_port.unwrap_or_default().split(':');
    let host = parts
        .next()
        .filter(|host| !host.is_empty())
        .unwrap_or(DEFAULT_HOST);
    let port = parts
        .next()
        .and_then(|port| port.parse::<u16>().ok())
        .filter(|port| *port != 0)
        .unwrap_or(DEFAULT_PORT);
    Address::tcp(host, port)
}

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

//! A resolver that follows the EndpointSlices of a Kubernetes service.
//!
//! `k8s:///my-service` resolves to every ready address of `my-service` that
//! exposes the port named by the `gww.k8s.port_name` channel option. The
//! resolver subscribes to a shared [`WatchCache`] on its first
//! [`resolve_now`](Resolver::resolve_now) and pushes an update whenever the
//! service's addresses change.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::{debug, trace, warn};

use super::{
    Address, ChannelController, Endpoint, Resolver, ResolverBuilder, ResolverOptions,
    ResolverUpdate, ServiceConfig, Target, WorkScheduler, pacer::Pacer,
};
use crate::{
    discovery::{Listener, WatchCache},
    rt::{Runtime, TaskHandle},
};

#[cfg(test)]
mod test;

const SCHEME: &str = "k8s";

/// Minimum time between two notifications requested through `resolve_now`.
const MIN_TIME_BETWEEN_NOTIFICATIONS: Duration = Duration::from_millis(250);

/// Builds resolvers for the `k8s` scheme, all sharing one [`WatchCache`].
#[derive(Debug, Clone)]
pub struct K8sResolverBuilder {
    cache: WatchCache,
}

impl K8sResolverBuilder {
    pub fn new(cache: WatchCache) -> Self {
        K8sResolverBuilder { cache }
    }
}

impl ResolverBuilder for K8sResolverBuilder {
    fn build(&self, target: &Target, options: ResolverOptions) -> Box<dyn Resolver> {
        let service_name = self.default_authority(target);
        let port_name = options.channel_options.port_name();
        debug!(%target, service = %service_name, port = %port_name, "building k8s resolver");
        Box::new(K8sResolver {
            target: target.to_string(),
            service_name,
            port_name,
            cache: self.cache.clone(),
            pacer: Pacer::new(MIN_TIME_BETWEEN_NOTIFICATIONS, options.runtime.clone()),
            runtime: options.runtime,
            work_scheduler: options.work_scheduler,
            shared: Arc::default(),
            registration: None,
        })
    }

    fn scheme(&self) -> &str {
        SCHEME
    }
}

struct K8sResolver {
    target: String,
    service_name: String,
    port_name: String,
    cache: WatchCache,
    runtime: Arc<dyn Runtime>,
    work_scheduler: Arc<dyn WorkScheduler>,
    pacer: Pacer,
    shared: Arc<SharedState>,
    registration: Option<Registration>,
}

/// State touched by the change forwarding task and the pacer's timer.
#[derive(Default)]
struct SharedState {
    has_seen_data: AtomicBool,
    notification_due: AtomicBool,
}

/// A live subscription to the cache. Dropping it stops the forwarding task
/// and removes the listener.
struct Registration {
    _listener: Listener,
    forwarder: Box<dyn TaskHandle>,
    // Set by the forwarder once the cache has ended the change stream.
    closed: Arc<AtomicBool>,
}

impl Registration {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

impl K8sResolver {
    fn register(&mut self) {
        let (listener, mut changes) = self.cache.add_listener(self.service_name.clone());
        if self.has_cached_endpoints() {
            self.shared.has_seen_data.store(true, Ordering::Release);
        }
        let shared = self.shared.clone();
        let pacer = self.pacer.clone();
        let work_scheduler = self.work_scheduler.clone();
        let service = self.service_name.clone();
        let closed = Arc::new(AtomicBool::new(false));
        let forwarder_closed = closed.clone();
        let forwarder = self.runtime.spawn(Box::pin(async move {
            while changes.changed().await.is_some() {
                trace!(%service, "endpoints changed");
                shared.has_seen_data.store(true, Ordering::Release);
                pacer.cancel();
                pacer.mark_fired();
                shared.notification_due.store(true, Ordering::Release);
                work_scheduler.schedule_work();
            }
            debug!(%service, "endpoint changes ended");
            forwarder_closed.store(true, Ordering::Release);
        }));
        // A closed registration is dropped only after the new listener is
        // added.
        self.registration = Some(Registration {
            _listener: listener,
            forwarder,
            closed,
        });
    }

    fn has_cached_endpoints(&self) -> bool {
        self.cache
            .get_addresses(&self.service_name)
            .iter()
            .any(|address| address.port_name == self.port_name)
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.cache
            .get_addresses(&self.service_name)
            .into_iter()
            .filter(|address| address.port_name == self.port_name)
            .map(|address| Endpoint::single(Address::tcp(address.host, address.port)))
            .collect()
    }
}

impl Resolver for K8sResolver {
    fn resolve_now(&mut self) {
        // Registers on first use, and again after the cache ended the
        // previous subscription.
        if self.registration.as_ref().is_none_or(Registration::is_closed) {
            self.register();
        }
        // Nothing is reported until the watch has delivered data once.
        if !self.shared.has_seen_data.load(Ordering::Acquire) {
            return;
        }

        let shared = self.shared.clone();
        let work_scheduler = self.work_scheduler.clone();
        self.pacer.schedule(move || {
            shared.notification_due.store(true, Ordering::Release);
            work_scheduler.schedule_work();
        });
    }

    fn work(&mut self, channel_controller: &mut dyn ChannelController) {
        if !self.shared.notification_due.swap(false, Ordering::AcqRel) {
            return;
        }
        let endpoints = self.endpoints();
        debug!(target = %self.target, endpoints = endpoints.len(), "k8s resolution");
        let update = if endpoints.is_empty() {
            ResolverUpdate {
                endpoints: Err(tonic::Status::unavailable(format!(
                    "No endpoints available for target {}",
                    self.target
                ))),
                ..Default::default()
            }
        } else {
            ResolverUpdate {
                endpoints: Ok(endpoints),
                service_config: Ok(Some(ServiceConfig::round_robin())),
                ..Default::default()
            }
        };
        if let Err(err) = channel_controller.update(update) {
            warn!(target = %self.target, error = %err, "channel rejected k8s resolution");
        }
    }
}

impl Drop for K8sResolver {
    fn drop(&mut self) {
        self.pacer.reset();
        self.registration = None;
    }
}

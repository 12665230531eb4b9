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

//! The process-wide EndpointSlice cache.
//!
//! One [`WatchCache`] holds one list/watch connection no matter how many
//! resolvers use it. The connection is opened when the first listener is
//! added and closed when the last one is removed. Records are kept by slice
//! name; the per-service address lists are always rebuilt from the records of
//! that service, never patched in place.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    pin::Pin,
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, trace, warn};

use super::{
    DiscoveryClient, EndpointRecord, EndpointSlice, WatchEvent, WatchEventType, normalize,
};
use crate::{
    error::{Error, Result},
    name_resolution::{BackoffConfig, DEFAULT_EXPONENTIAL_CONFIG, ExponentialBackoff},
    rt::{self, Runtime, TaskHandle},
};


static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL_WATCH_CACHE: OnceLock<WatchCache> = OnceLock::new();

/// Installs `cache` as the process-wide watch cache. Fails, handing the cache
/// back, if one was installed before.
pub fn install_global(cache: WatchCache) -> std::result::Result<(), WatchCache> {
    GLOBAL_WATCH_CACHE.set(cache)
}

/// Returns the process-wide watch cache, if one was installed.
pub fn global() -> Option<WatchCache> {
    GLOBAL_WATCH_CACHE.get().cloned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One entry of a service's address list: a ready host and one of the named
/// ports of the slice it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceAddress {
    pub host: String,
    pub port_name: String,
    pub port: u16,
}

/// Lifecycle of the cache's watch connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchPhase {
    /// No listeners; no connection.
    #[default]
    Stopped,
    /// Loading the cluster context and listing the current slices.
    Starting,
    /// Receiving watch events.
    Running,
    /// Waiting before the next attempt after a failure.
    BackingOff,
}

/// Configuration of a [`WatchCache`].
pub struct WatchCacheOptions {
    /// Runtime the watch task is spawned on.
    pub runtime: Arc<dyn Runtime>,
    /// Delays applied between failed watch attempts.
    pub backoff: BackoffConfig,
}

impl Default for WatchCacheOptions {
    fn default() -> Self {
        WatchCacheOptions {
            runtime: rt::default_runtime(),
            backoff: DEFAULT_EXPONENTIAL_CONFIG,
        }
    }
}

/// A shared cache of the EndpointSlices in one namespace.
///
/// Cloning the cache yields another handle to the same state and connection.
#[derive(Clone)]
pub struct WatchCache {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn DiscoveryClient>,
    runtime: Arc<dyn Runtime>,
    backoff: ExponentialBackoff,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    records: BTreeMap<String, EndpointRecord>,
    addresses: HashMap<String, Vec<ServiceAddress>>,
    listeners: HashMap<String, HashMap<ListenerId, mpsc::UnboundedSender<()>>>,
    phase: WatchPhase,
    task: Option<Box<dyn TaskHandle>>,
    // Identifies the live watch task. Work done by a task whose generation no
    // longer matches is discarded.
    generation: u64,
}

impl fmt::Debug for WatchCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("WatchCache")
            .field("phase", &state.phase)
            .field("records", &state.records.len())
            .field("services", &state.listeners.len())
            .finish()
    }
}

impl WatchCache {
    /// Creates a cache using `client`, the default runtime and the default
    /// backoff. No connection is made until a listener is added.
    pub fn new(client: Arc<dyn DiscoveryClient>) -> Self {
        Self::from_parts(
            client,
            rt::default_runtime(),
            ExponentialBackoff::with_defaults(),
        )
    }

    /// Creates a cache with explicit options.
    pub fn with_options(
        client: Arc<dyn DiscoveryClient>,
        options: WatchCacheOptions,
    ) -> Result<Self> {
        let backoff = ExponentialBackoff::new(options.backoff)?;
        Ok(Self::from_parts(client, options.runtime, backoff))
    }

    fn from_parts(
        client: Arc<dyn DiscoveryClient>,
        runtime: Arc<dyn Runtime>,
        backoff: ExponentialBackoff,
    ) -> Self {
        WatchCache {
            inner: Arc::new(Inner {
                client,
                runtime,
                backoff,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Registers interest in `service_name`.
    ///
    /// The returned [`Changes`] yields once for every update of the service's
    /// addresses. Dropping the [`Listener`] (or passing it to
    /// [`remove_listener`](Self::remove_listener)) withdraws the interest.
    pub fn add_listener(&self, service_name: impl Into<String>) -> (Listener, Changes) {
        let service_name = service_name.into();
        let id = ListenerId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(service = %service_name, "watch add listener");

        let mut state = self.inner.state.lock();
        state
            .listeners
            .entry(service_name.clone())
            .or_default()
            .insert(id, tx);
        if state.phase == WatchPhase::Stopped {
            start_watch(&self.inner, &mut state);
        }
        drop(state);

        let listener = Listener {
            id,
            service_name,
            inner: Arc::downgrade(&self.inner),
        };
        (listener, Changes { rx })
    }

    /// Withdraws the interest registered by `listener`.
    pub fn remove_listener(&self, listener: Listener) {
        drop(listener);
    }

    /// Returns a snapshot of the addresses currently known for
    /// `service_name`. Never starts a watch.
    pub fn get_addresses(&self, service_name: &str) -> Vec<ServiceAddress> {
        self.inner
            .state
            .lock()
            .addresses
            .get(service_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Reports the state of the watch connection.
    pub fn watch_phase(&self) -> WatchPhase {
        self.inner.state.lock().phase
    }

    /// Closes the connection and ends every listener's [`Changes`] stream.
    /// Listeners added afterwards start a new watch.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.listeners.clear();
        stop_watch(&mut state);
        debug!("watch cache shut down");
    }
}

fn start_watch(inner: &Arc<Inner>, state: &mut State) {
    state.generation += 1;
    state.phase = WatchPhase::Starting;
    let generation = state.generation;
    let task = inner.runtime.spawn(Box::pin(inner.clone().run(generation)));
    state.task = Some(task);
    debug!(generation, "starting endpoint slice watch");
}

fn stop_watch(state: &mut State) {
    state.generation += 1;
    state.phase = WatchPhase::Stopped;
    if let Some(task) = state.task.take() {
        task.abort();
        debug!("stopped endpoint slice watch");
    }
}

impl Inner {
    async fn run(self: Arc<Self>, generation: u64) {
        let mut backoff = self.backoff.clone();
        loop {
            let err = match self.list_and_watch(generation, &mut backoff).await {
                Ok(()) => return,
                Err(err) => err,
            };
            let delay = backoff.next_delay();
            if !self.set_phase(generation, WatchPhase::BackingOff) {
                return;
            }
            warn!(error = %err, ?delay, "endpoint slice watch failed, restarting after backoff");
            self.runtime.sleep(delay).await;
            if !self.set_phase(generation, WatchPhase::Starting) {
                return;
            }
        }
    }

    /// Lists the current slices and follows the watch until it fails.
    /// Returns `Ok` only when this task has been superseded.
    async fn list_and_watch(
        &self,
        generation: u64,
        backoff: &mut ExponentialBackoff,
    ) -> Result<()> {
        let context = self.client.load_context().await?;
        let list = self.client.list(&context.namespace).await?;
        if !self.replace_records(generation, &list.items) {
            return Ok(());
        }

        let resource_version = list.metadata.resource_version.as_deref();
        let mut events = self.client.watch(&context.namespace, resource_version).await?;
        if !self.set_phase(generation, WatchPhase::Running) {
            return Ok(());
        }
        backoff.reset();
        debug!(
            namespace = %context.namespace,
            ?resource_version,
            "endpoint slice watch established"
        );

        while let Some(event) = events.next().await {
            if !self.apply_event(generation, event?) {
                return Ok(());
            }
        }
        Err(Error::StreamClosed)
    }

    fn set_phase(&self, generation: u64, phase: WatchPhase) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.phase = phase;
        true
    }

    /// Replaces every record with the result of a full list. Every service
    /// that owned a record before or after is refreshed, changed or not.
    fn replace_records(&self, generation: u64, items: &[EndpointSlice]) -> bool {
        let records: BTreeMap<String, EndpointRecord> = items
            .iter()
            .filter_map(normalize)
            .map(|record| (record.record_id.clone(), record))
            .collect();

        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        let mut services: HashSet<String> = state
            .records
            .values()
            .map(|record| record.service_name.clone())
            .collect();
        services.extend(records.values().map(|record| record.service_name.clone()));
        state.records = records;
        for service in &services {
            state.refresh(service);
        }
        debug!(
            records = state.records.len(),
            services = services.len(),
            "listed endpoint slices"
        );
        true
    }

    fn apply_event(&self, generation: u64, event: WatchEvent) -> bool {
        let record = match event.event_type {
            WatchEventType::Bookmark => None,
            _ => normalize(&event.object),
        };

        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        let Some(record) = record else {
            return true;
        };
        trace!(
            event = ?event.event_type,
            record = %record.record_id,
            service = %record.service_name,
            "watch event"
        );

        let service = record.service_name.clone();
        let previous = match event.event_type {
            WatchEventType::Deleted => state.records.remove(&record.record_id),
            _ => state.records.insert(record.record_id.clone(), record),
        };
        if let Some(previous) = previous.filter(|previous| previous.service_name != service) {
            state.refresh(&previous.service_name);
        }
        state.refresh(&service);
        true
    }

    fn remove_listener(&self, service_name: &str, id: ListenerId) {
        debug!(service = %service_name, "watch remove listener");
        let mut state = self.state.lock();
        if let Some(listeners) = state.listeners.get_mut(service_name) {
            listeners.remove(&id);
            if listeners.is_empty() {
                state.listeners.remove(service_name);
            }
        }
        if state.listeners.is_empty() && state.phase != WatchPhase::Stopped {
            stop_watch(&mut state);
        }
    }
}

impl State {
    /// Rebuilds the address list of `service` and notifies its listeners.
    fn refresh(&mut self, service: &str) {
        let addresses: Vec<ServiceAddress> = self
            .records
            .values()
            .filter(|record| record.service_name == service)
            .flat_map(|record| {
                record.hosts.iter().flat_map(move |host| {
                    record.ports.iter().map(move |port| ServiceAddress {
                        host: host.clone(),
                        port_name: port.name.clone(),
                        port: port.port,
                    })
                })
            })
            .collect();
        if addresses.is_empty() {
            self.addresses.remove(service);
        } else {
            self.addresses.insert(service.to_string(), addresses);
        }

        if let Some(listeners) = self.listeners.get(service) {
            debug!(%service, listeners = listeners.len(), "watch notify");
            for tx in listeners.values() {
                let _ = tx.send(());
            }
        }
    }
}

/// Registration handle returned by [`WatchCache::add_listener`]. Dropping it
/// removes the registration.
#[derive(Debug)]
pub struct Listener {
    id: ListenerId,
    service_name: String,
    inner: Weak<Inner>,
}

impl Listener {
    /// The service this listener is interested in.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_listener(&self.service_name, self.id);
        }
    }
}

/// Change notifications for one listener, in the order the watch delivered
/// them. Ends once the listener is removed or the cache shuts down.
#[derive(Debug)]
pub struct Changes {
    rx: mpsc::UnboundedReceiver<()>,
}

impl Changes {
    /// Waits for the next change. Returns `None` once the stream has ended.
    pub async fn changed(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

impl Stream for Changes {
    type Item = ();

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<()>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

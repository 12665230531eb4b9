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

//! A scripted [`DiscoveryClient`] for tests.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    ClusterContext, DiscoveryClient, EndpointConditions, EndpointSlice, EndpointSliceList,
    ListMeta, ObjectMeta, SERVICE_NAME_LABEL, ServiceAddress, SliceEndpoint, SlicePort,
    WatchCache, WatchEvent, WatchEventType, WatchPhase, WatchStream,
};
use crate::error::{Error, Result};

pub(crate) const NAMESPACE: &str = "default";
pub(crate) const RESOURCE_VERSION: &str = "100";

/// Calls observed by a [`FakeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    List,
    Watch(Option<String>),
}

pub(crate) struct FakeClient {
    namespace: Option<String>,
    lists: Mutex<VecDeque<Result<EndpointSliceList>>>,
    watch_tx: Mutex<Option<mpsc::UnboundedSender<Result<WatchEvent>>>>,
    calls: mpsc::UnboundedSender<Call>,
}

impl FakeClient {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Call>) {
        Self::with_namespace(Some(NAMESPACE))
    }

    pub(crate) fn with_namespace(
        namespace: Option<&str>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Call>) {
        let (calls, calls_rx) = mpsc::unbounded_channel();
        let client = FakeClient {
            namespace: namespace.map(str::to_string),
            lists: Mutex::default(),
            watch_tx: Mutex::default(),
            calls,
        };
        (Arc::new(client), calls_rx)
    }

    /// Queues the result of a future list call. Unscripted calls return an
    /// empty list.
    pub(crate) fn queue_list(&self, result: Result<EndpointSliceList>) {
        self.lists.lock().push_back(result);
    }

    /// Delivers `event` on the most recently opened watch.
    pub(crate) fn send(&self, event: Result<WatchEvent>) {
        let watch_tx = self.watch_tx.lock();
        let tx = watch_tx.as_ref().expect("no watch has been opened");
        tx.send(event).expect("watch stream was dropped");
    }

    /// Ends the most recently opened watch without an error.
    pub(crate) fn end_watch(&self) {
        self.watch_tx.lock().take();
    }

    /// Reports whether the cache dropped the most recently opened watch.
    pub(crate) fn watch_closed(&self) -> bool {
        self.watch_tx
            .lock()
            .as_ref()
            .is_none_or(mpsc::UnboundedSender::is_closed)
    }
}

#[tonic::async_trait]
impl DiscoveryClient for FakeClient {
    async fn load_context(&self) -> Result<ClusterContext> {
        self.namespace
            .clone()
            .map(|namespace| ClusterContext { namespace })
            .ok_or(Error::MissingNamespace)
    }

    async fn list(&self, namespace: &str) -> Result<EndpointSliceList> {
        assert_eq!(namespace, NAMESPACE);
        let _ = self.calls.send(Call::List);
        self.lists
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(slice_list(Vec::new())))
    }

    async fn watch(&self, namespace: &str, resource_version: Option<&str>) -> Result<WatchStream> {
        assert_eq!(namespace, NAMESPACE);
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.watch_tx.lock() = Some(tx);
        let _ = self.calls.send(Call::Watch(resource_version.map(str::to_string)));
        Ok(Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }))
    }
}

/// A slice of ready endpoints, one per host, all exposing `ports` over TCP.
pub(crate) fn slice(
    id: &str,
    service: &str,
    hosts: &[&str],
    ports: &[(&str, i32)],
) -> EndpointSlice {
    EndpointSlice {
        metadata: ObjectMeta {
            name: Some(id.to_string()),
            labels: Some(BTreeMap::from([(
                SERVICE_NAME_LABEL.to_string(),
                service.to_string(),
            )])),
            resource_version: None,
        },
        endpoints: hosts
            .iter()
            .map(|host| SliceEndpoint {
                addresses: vec![host.to_string()],
                conditions: Some(EndpointConditions {
                    ready: Some(true),
                    serving: Some(true),
                    terminating: Some(false),
                }),
            })
            .collect(),
        ports: Some(
            ports
                .iter()
                .map(|(name, port)| SlicePort {
                    name: Some(name.to_string()),
                    protocol: Some("TCP".to_string()),
                    port: Some(*port),
                })
                .collect(),
        ),
    }
}

pub(crate) fn slice_list(items: Vec<EndpointSlice>) -> EndpointSliceList {
    EndpointSliceList {
        metadata: ListMeta {
            resource_version: Some(RESOURCE_VERSION.to_string()),
        },
        items,
    }
}

pub(crate) fn event(event_type: WatchEventType, object: EndpointSlice) -> Result<WatchEvent> {
    Ok(WatchEvent { event_type, object })
}

pub(crate) fn address(host: &str, port_name: &str, port: u16) -> ServiceAddress {
    ServiceAddress {
        host: host.to_string(),
        port_name: port_name.to_string(),
        port,
    }
}

/// Yields to the runtime until the cache reaches `want`.
pub(crate) async fn wait_for_phase(cache: &WatchCache, want: WatchPhase) {
    for _ in 0..1000 {
        if cache.watch_phase() == want {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "watch never reached {want:?}, stuck in {:?}",
        cache.watch_phase()
    );
}

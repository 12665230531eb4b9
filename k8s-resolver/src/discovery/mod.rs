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

//! Service discovery through the Kubernetes EndpointSlice API.
//!
//! The [`WatchCache`] owns the single list/watch connection of a process and
//! turns EndpointSlices into per-service address lists. How the API is
//! reached is left to a [`DiscoveryClient`] implementation, which only has to
//! honor the list-then-watch contract described on the trait.

use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
};

use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

use crate::error::{Error, Result};

mod cache;
mod endpoint_slice;
#[cfg(test)]
pub(crate) mod test_utils;

pub use cache::{
    Changes, Listener, ServiceAddress, WatchCache, WatchCacheOptions, WatchPhase, global,
    install_global,
};
pub use endpoint_slice::{
    EndpointConditions, EndpointRecord, EndpointSlice, NamedPort, ObjectMeta, SERVICE_NAME_LABEL,
    SliceEndpoint, SlicePort, normalize,
};

/// Environment variable consulted first for the namespace to watch.
pub const NAMESPACE_ENV: &str = "POD_NAMESPACE";

/// Environment variable naming the kubeconfig file. Only the first entry of
/// a path list is read.
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Namespace file mounted into every pod with a service account.
pub const SERVICE_ACCOUNT_NAMESPACE_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// The cluster coordinates the watch runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterContext {
    pub namespace: String,
}

impl ClusterContext {
    /// Loads the namespace from [`NAMESPACE_ENV`], then from the first
    /// context of the kubeconfig file (`$KUBECONFIG`, else
    /// `~/.kube/config`), then from [`SERVICE_ACCOUNT_NAMESPACE_PATH`].
    pub fn from_environment() -> Result<Self> {
        Self::load(
            std::env::var(NAMESPACE_ENV).ok(),
            kubeconfig_path().as_deref(),
            Path::new(SERVICE_ACCOUNT_NAMESPACE_PATH),
        )
    }

    pub(crate) fn load(
        env_namespace: Option<String>,
        kubeconfig: Option<&Path>,
        namespace_file: &Path,
    ) -> Result<Self> {
        if let Some(namespace) = non_empty(env_namespace.as_deref()) {
            return Ok(ClusterContext { namespace });
        }
        let from_kubeconfig = kubeconfig.map(kubeconfig_namespace).transpose()?;
        if let Some(namespace) = from_kubeconfig.flatten() {
            return Ok(ClusterContext { namespace });
        }
        match std::fs::read_to_string(namespace_file) {
            Ok(contents) => non_empty(Some(&contents))
                .map(|namespace| ClusterContext { namespace })
                .ok_or(Error::MissingNamespace),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::MissingNamespace),
            Err(err) => Err(Error::Context(err)),
        }
    }
}

fn kubeconfig_path() -> Option<PathBuf> {
    match std::env::var_os(KUBECONFIG_ENV) {
        Some(paths) => std::env::split_paths(&paths).find(|path| !path.as_os_str().is_empty()),
        None => std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".kube/config")),
    }
}

/// The parts of a kubeconfig file the namespace lookup reads.
#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(default)]
    contexts: Option<Vec<NamedContext>>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    #[serde(default)]
    context: Option<KubeContext>,
}

#[derive(Debug, Deserialize)]
struct KubeContext {
    #[serde(default)]
    namespace: Option<String>,
}

/// Returns the namespace of the first context in the kubeconfig at `path`.
/// A missing file, or a first context without a namespace, yields `None`.
fn kubeconfig_namespace(path: &Path) -> Result<Option<String>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::Context(err)),
    };
    let config: Kubeconfig = serde_yaml::from_str(&contents)?;
    let namespace = config
        .contexts
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|named| named.context)
        .and_then(|context| context.namespace);
    Ok(non_empty(namespace.as_deref()))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Metadata of a list response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    /// The cursor a watch resumes from.
    #[serde(default)]
    pub resource_version: Option<String>,
}

/// The response of a one-shot list call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSliceList {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<EndpointSlice>,
}

/// The kind of change a watch event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    /// Progress marker carrying only a resource version.
    Bookmark,
}

/// One event of a watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    pub object: EndpointSlice,
}

/// The stream of events returned by [`DiscoveryClient::watch`].
pub type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchEvent>> + Send>>;

/// Access to the EndpointSlice API of one cluster.
///
/// The watch cache calls [`list`](Self::list) once and then
/// [`watch`](Self::watch) from the returned resource version. The stream
/// yields events until it fails or ends; either way the cache backs off and
/// starts over with a fresh list. Dropping the stream must close the
/// underlying connection.
#[tonic::async_trait]
pub trait DiscoveryClient: Send + Sync + 'static {
    /// Determines the namespace to watch.
    async fn load_context(&self) -> Result<ClusterContext> {
        ClusterContext::from_environment()
    }

    /// Lists every EndpointSlice in `namespace`.
    async fn list(&self, namespace: &str) -> Result<EndpointSliceList>;

    /// Watches EndpointSlices in `namespace`, starting after
    /// `resource_version`.
    async fn watch(&self, namespace: &str, resource_version: Option<&str>) -> Result<WatchStream>;
}

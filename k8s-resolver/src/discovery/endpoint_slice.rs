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

//! EndpointSlice wire types and their normalization into cache records.
//!
//! The types mirror the JSON served by the `discovery.k8s.io/v1` API closely
//! enough for a [`DiscoveryClient`](super::DiscoveryClient) to deserialize
//! responses into them directly. Only the fields the resolver reads are kept.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::trace;

/// The label Kubernetes sets on every EndpointSlice owned by a service.
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

// The API server renders empty lists as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An EndpointSlice as returned by the discovery API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSlice {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, deserialize_with = "null_as_default")]
    pub endpoints: Vec<SliceEndpoint>,
    #[serde(default)]
    pub ports: Option<Vec<SlicePort>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub resource_version: Option<String>,
}

/// One backend of a slice; usually a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceEndpoint {
    #[serde(default, deserialize_with = "null_as_default")]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub conditions: Option<EndpointConditions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConditions {
    #[serde(default)]
    pub ready: Option<bool>,
    #[serde(default)]
    pub serving: Option<bool>,
    #[serde(default)]
    pub terminating: Option<bool>,
}

impl EndpointConditions {
    fn is_usable(&self) -> bool {
        self.ready == Some(true) && self.serving == Some(true) && self.terminating != Some(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlicePort {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub port: Option<i32>,
}

/// A named TCP port exposed by every host of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedPort {
    pub name: String,
    pub port: u16,
}

/// The normalized form of one EndpointSlice, as stored by the watch cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRecord {
    /// The slice name; unique within the watched namespace.
    pub record_id: String,
    /// The owning service, or the empty string for unowned slices.
    pub service_name: String,
    /// Addresses of ready, serving, non-terminating endpoints in random order.
    pub hosts: Vec<String>,
    pub ports: Vec<NamedPort>,
}

/// Converts a slice into a record. Returns `None` for slices without a name.
///
/// Endpoints that are not ready, not serving or terminating are left out, as
/// are ports that are unnamed, not TCP, or missing a valid number. Hosts are
/// returned in random order.
pub fn normalize(slice: &EndpointSlice) -> Option<EndpointRecord> {
    trace!(?slice, "normalizing endpoint slice");
    let record_id = slice.metadata.name.clone().filter(|name| !name.is_empty())?;
    let service_name = slice
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(SERVICE_NAME_LABEL))
        .cloned()
        .unwrap_or_default();

    let mut hosts: Vec<String> = slice
        .endpoints
        .iter()
        .filter(|endpoint| {
            endpoint
                .conditions
                .as_ref()
                .is_some_and(EndpointConditions::is_usable)
        })
        .flat_map(|endpoint| endpoint.addresses.iter().cloned())
        .collect();
    hosts.shuffle(&mut rand::rng());

    let ports = slice
        .ports
        .iter()
        .flatten()
        .filter_map(|port| {
            let name = port.name.as_deref().filter(|name| !name.is_empty())?;
            if port.protocol.as_deref() != Some("TCP") {
                return None;
            }
            let number = u16::try_from(port.port?).ok()?;
            Some(NamedPort {
                name: name.to_string(),
                port: number,
            })
        })
        .collect();

    Some(EndpointRecord {
        record_id,
        service_name,
        hosts,
        ports,
    })
}

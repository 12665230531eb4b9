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

//! Name resolution for gRPC channels.
//!
//! A channel's target is converted into network addresses by a [`Resolver`]
//! built for the target's URI scheme. This module defines that contract and
//! ships two resolvers:
//!
//! * [`K8sResolverBuilder`] (`k8s:///service`) follows the EndpointSlices of a
//!   Kubernetes service through a shared [`WatchCache`].
//! * [`FixedResolverBuilder`] (`fixed:///authority`) maps authorities to
//!   static `host:port` pairs configured through channel options.
//!
//! [`WatchCache`]: crate::discovery::WatchCache
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
    sync::Arc,
};

use url::Url;

use crate::{options::ChannelOptions, rt::Runtime};

mod backoff;
mod fixed;
mod k8s;
mod pacer;
mod service_config;
#[cfg(test)]
mod test_utils;

pub use backoff::{BackoffConfig, DEFAULT_EXPONENTIAL_CONFIG};
pub(crate) use backoff::ExponentialBackoff;
pub use fixed::FixedResolverBuilder;
pub use k8s::K8sResolverBuilder;
pub use service_config::{LbPolicy, ServiceConfig};

/// A parsed channel target URI, e.g. `k8s:///my-service`.
///
/// Both resolvers in this crate only look at the path: `k8s:///my-service`
/// and `k8s:my-service` name the same service. See the gRPC naming document
/// for the general URI grammar.
#[derive(Debug, Clone)]
pub struct Target {
    url: Url,
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|err| err.to_string())?;
        Ok(Target { url })
    }
}

impl From<Url> for Target {
    fn from(url: Url) -> Self {
        Target { url }
    }
}

impl Target {
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host of the URI authority, empty when there is none.
    pub fn authority_host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Port of the URI authority, if one was given.
    pub fn authority_port(&self) -> Option<u16> {
        self.url.port()
    }

    /// The URI authority as `host` or `host:port`.
    pub fn authority_host_port(&self) -> String {
        match self.authority_port() {
            Some(port) => format!("{}:{port}", self.authority_host()),
            None => self.authority_host().to_string(),
        }
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            self.scheme(),
            self.authority_host_port(),
            self.path()
        )
    }
}

/// Creates [`Resolver`]s for one URI scheme. A channel looks up the builder
/// by the scheme of its target and builds one resolver per channel.
pub trait ResolverBuilder: Send + Sync {
    /// Creates the resolver for `target`.
    ///
    /// Building must not fail and must not start any resolution work; the
    /// channel asks for the first resolution through
    /// [`Resolver::resolve_now`].
    fn build(&self, target: &Target, options: ResolverOptions) -> Box<dyn Resolver>;

    /// The URI scheme this builder is registered under.
    fn scheme(&self) -> &str;

    /// The authority a channel uses for `target` when none is configured:
    /// the target path without its leading `/`.
    fn default_authority(&self, target: &Target) -> String {
        let path = target.path();
        path.strip_prefix("/").unwrap_or(path).to_string()
    }

    /// Reports whether a resolver can be built for `target`. Targets without
    /// an authority are rejected.
    fn is_valid_uri(&self, target: &Target) -> bool {
        !self.default_authority(target).is_empty()
    }
}

/// Everything a resolver receives from the channel that builds it.
pub struct ResolverOptions {
    /// Runtime used for background tasks and timers.
    pub runtime: Arc<dyn Runtime>,

    /// Asks the channel for a call to [`Resolver::work`].
    pub work_scheduler: Arc<dyn WorkScheduler>,

    /// The options the channel was created with.
    pub channel_options: ChannelOptions,
}

/// The channel's side of [`Resolver::work`] scheduling.
pub trait WorkScheduler: Send + Sync {
    /// Requests a call to [`Resolver::work`]. Requests made before that call
    /// starts may be merged into it.
    fn schedule_work(&self);
}

/// Resolver produces updates for one target.
///
/// Dropping a resolver releases everything it holds: pending timers are
/// cancelled and shared registrations are removed.
pub trait Resolver: Send + Sync {
    /// Asks the resolver to obtain an updated resolver result.
    ///
    /// A channel calls this repeatedly while it is unable to connect. The
    /// resolvers in this crate pace these requests, so calling it in a tight
    /// loop yields at most one update per pacing interval.
    fn resolve_now(&mut self);

    /// Gives the resolver access to the channel. Calls never overlap. A
    /// resolver only pushes an update if one is due.
    fn work(&mut self, channel_controller: &mut dyn ChannelController);
}

/// What a resolver may do with its channel during [`Resolver::work`].
pub trait ChannelController: Send + Sync {
    /// Hands the latest resolution to the channel. An error means the channel
    /// could not use it.
    fn update(&mut self, update: ResolverUpdate) -> Result<(), String>;
}

/// One resolution result.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ResolverUpdate {
    /// The servers for the target, one endpoint each, or the status that
    /// explains why there are none.
    pub endpoints: Result<Vec<Endpoint>, tonic::Status>,

    /// Service config for the target. `None` leaves the channel's default in
    /// place.
    pub service_config: Result<Option<ServiceConfig>, String>,

    /// Free-form text attached to the result for diagnostics.
    pub resolution_note: Option<String>,
}

impl Default for ResolverUpdate {
    fn default() -> Self {
        ResolverUpdate {
            endpoints: Ok(Vec::new()),
            service_config: Ok(None),
            resolution_note: None,
        }
    }
}

/// One logical server, reachable through any of its addresses.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub struct Endpoint {
    pub addresses: Vec<Address>,
}

impl Endpoint {
    pub(crate) fn single(address: Address) -> Self {
        Endpoint {
            addresses: vec![address],
        }
    }
}

/// A network location of a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub struct Address {
    /// Transport to connect with. Always [`TCP_IP_NETWORK_TYPE`] here.
    pub network_type: &'static str,

    /// An IP address or host name.
    pub host: String,

    pub port: u16,
}

impl Address {
    pub(crate) fn tcp(host: impl Into<String>, port: u16) -> Self {
        Address {
            network_type: TCP_IP_NETWORK_TYPE,
            host: host.into(),
            port,
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Network type of addresses reached over TCP.
pub static TCP_IP_NETWORK_TYPE: &str = "tcp";

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

//! Kubernetes-aware name resolution for gRPC clients.
//!
//! This crate resolves `k8s:///<service>` targets to the ready pod addresses
//! of a Kubernetes service, and `fixed:///<authority>` targets to statically
//! configured addresses. It handles:
//! - one shared EndpointSlice list/watch connection per process, opened and
//!   closed on demand ([`discovery::WatchCache`])
//! - translating watched slices into per-service address lists
//! - pacing re-resolution requests from the channel
//!
//! It does NOT contain a Kubernetes API client. Applications provide one by
//! implementing [`discovery::DiscoveryClient`].
//!
//! # Example
//!
//! ```ignore
//! use k8s_resolver::{discovery::WatchCache, name_resolution::K8sResolverBuilder};
//!
//! let cache = WatchCache::new(Arc::new(my_api_client));
//! let builder = K8sResolverBuilder::new(cache);
//! // Hand `builder` to the channel, which builds one resolver per target.
//! ```

pub mod discovery;
pub mod error;
pub mod name_resolution;
pub mod options;
pub mod rt;

pub use error::{Error, Result};

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

//! Error types for the resolver crate.

use thiserror::Error;

/// Errors produced while talking to the discovery API or configuring the
/// resolvers.
///
/// Watch failures never reach a gRPC channel: the watch cache logs them and
/// retries. They are surfaced here so that `DiscoveryClient` implementations
/// have a common vocabulary.
#[derive(Debug, Error)]
pub enum Error {
    /// No namespace could be found in the ambient cluster configuration.
    #[error("no namespace found in cluster configuration")]
    MissingNamespace,

    /// The cluster configuration could not be read.
    #[error("failed to read cluster configuration: {0}")]
    Context(#[from] std::io::Error),

    /// The kubeconfig file could not be parsed.
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(#[from] serde_yaml::Error),

    /// The one-shot list call failed.
    #[error("list call failed: {0}")]
    List(String),

    /// The streaming watch call failed.
    #[error("watch failed: {0}")]
    Watch(String),

    /// The watch stream ended without an error.
    #[error("watch stream closed")]
    StreamClosed,

    /// A backoff configuration was rejected.
    #[error("invalid backoff configuration: {0}")]
    InvalidBackoff(&'static str),

    /// Channel options could not be parsed.
    #[error("invalid channel options: {0}")]
    InvalidOptions(String),

    /// An error raised by the discovery client's transport.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type alias for resolver operations.
pub type Result<T> = std::result::Result<T, Error>;

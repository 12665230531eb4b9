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

//! Channel options understood by the resolvers in this crate.
//!
//! A channel passes its options to every resolver it builds as a string-keyed
//! bag of JSON values. Unknown keys are ignored. A recognized key holding a
//! value of the wrong type is logged and treated as absent.

use std::{collections::HashMap, time::Duration};

use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// The name of the port to select from the discovered EndpointSlices.
///
/// type: string, default: `"grpc"`
pub const PORT_NAME: &str = "gww.k8s.port_name";

/// The map of authority to `host:port` used by the fixed resolver. A missing
/// host resolves to `127.0.0.1` and a missing port to `443`.
///
/// type: object of strings, default: `{}`
pub const AUTHORITY_MAP: &str = "gww.fixed.authority_map";

/// The minimum time between two fixed resolutions, in milliseconds.
///
/// type: integer, default: `1000`
pub const MIN_TIME_BETWEEN_RESOLUTIONS_MS: &str = "gww.fixed.min_time_between_resolutions_ms";

pub(crate) const DEFAULT_PORT_NAME: &str = "grpc";
pub(crate) const DEFAULT_MIN_TIME_BETWEEN_RESOLUTIONS: Duration = Duration::from_millis(1000);

/// A string-keyed configuration bag supplied by the channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelOptions {
    values: HashMap<String, Value>,
}

impl ChannelOptions {
    /// Creates an empty set of options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON object, e.g.
    /// `{"gww.k8s.port_name": "http"}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let values: HashMap<String, Value> =
            serde_json::from_str(json).map_err(|err| Error::InvalidOptions(err.to_string()))?;
        Ok(Self { values })
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub(crate) fn port_name(&self) -> String {
        match self.get(PORT_NAME) {
            None => DEFAULT_PORT_NAME.to_string(),
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                warn!(key = PORT_NAME, value = %other, "ignoring non-string channel option");
                DEFAULT_PORT_NAME.to_string()
            }
        }
    }

    pub(crate) fn authority_map(&self) -> HashMap<String, String> {
        let Some(value) = self.get(AUTHORITY_MAP) else {
            return HashMap::new();
        };
        let Value::Object(entries) = value else {
            warn!(key = AUTHORITY_MAP, value = %value, "ignoring non-object channel option");
            return HashMap::new();
        };
        entries
            .iter()
            .filter_map(|(authority, host_port)| match host_port {
                Value::String(host_port) => Some((authority.clone(), host_port.clone())),
                other => {
                    warn!(
                        key = AUTHORITY_MAP,
                        %authority,
                        value = %other,
                        "ignoring non-string authority mapping"
                    );
                    None
                }
            })
            .collect()
    }

    pub(crate) fn min_time_between_resolutions(&self) -> Duration {
        match self.get(MIN_TIME_BETWEEN_RESOLUTIONS_MS) {
            None => DEFAULT_MIN_TIME_BETWEEN_RESOLUTIONS,
            Some(value) => match value.as_u64() {
                Some(ms) => Duration::from_millis(ms),
                None => {
                    warn!(
                        key = MIN_TIME_BETWEEN_RESOLUTIONS_MS,
                        %value,
                        "ignoring non-integer channel option"
                    );
                    DEFAULT_MIN_TIME_BETWEEN_RESOLUTIONS
                }
            },
        }
    }
}

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

use serde_json::{Value, json};

/// The load balancing policy a resolver asks the channel to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum LbPolicy {
    RoundRobin,
}

impl LbPolicy {
    /// The registered name of the policy.
    pub fn name(&self) -> &'static str {
        match self {
            LbPolicy::RoundRobin => "round_robin",
        }
    }
}

/// An in-memory representation of a service config.
///
/// Resolvers in this crate only choose the load balancing policy; per-method
/// configuration is never provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub load_balancing_policy: LbPolicy,
}

impl ServiceConfig {
    pub(crate) fn round_robin() -> Self {
        ServiceConfig {
            load_balancing_policy: LbPolicy::RoundRobin,
        }
    }

    /// Renders the config in the JSON form defined by
    /// https://github.com/grpc/grpc/blob/master/doc/service_config.md.
    pub fn to_json(&self) -> Value {
        let policy = self.load_balancing_policy.name();
        json!({
            "loadBalancingConfig": [{ policy: {} }],
            "methodConfig": [],
        })
    }
}

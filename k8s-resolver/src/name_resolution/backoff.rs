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

//! Jittered exponential backoff used when restarting a failed watch.

use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};

/// Parameters of an exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// The delay after the first failure.
    pub base_delay: Duration,

    /// Growth factor applied after every failure. Must be at least 1.
    pub multiplier: f64,

    /// Fraction of the delay that is randomized, in `[0, 1]`.
    pub jitter: f64,

    /// The upper bound of the delay, before jitter.
    pub max_delay: Duration,
}

/// The values from https://github.com/grpc/grpc/blob/master/doc/connection-backoff.md.
pub const DEFAULT_EXPONENTIAL_CONFIG: BackoffConfig = BackoffConfig {
    base_delay: Duration::from_secs(1),
    multiplier: 1.6,
    jitter: 0.2,
    max_delay: Duration::from_secs(120),
};

impl Default for BackoffConfig {
    fn default() -> Self {
        DEFAULT_EXPONENTIAL_CONFIG
    }
}

impl BackoffConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.base_delay > self.max_delay {
            return Err(Error::InvalidBackoff(
                "base_delay must not exceed max_delay",
            ));
        }
        if self.multiplier < 1.0 {
            return Err(Error::InvalidBackoff("multiplier must be at least 1.0"));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::InvalidBackoff("jitter must be within [0, 1]"));
        }
        Ok(())
    }
}

/// Stateful delay calculator for consecutive failures.
#[derive(Debug, Clone)]
pub(crate) struct ExponentialBackoff {
    config: BackoffConfig,
    // Kept as f64 seconds to avoid accumulating rounding errors.
    next_delay_secs: f64,
}

impl ExponentialBackoff {
    pub(crate) fn new(config: BackoffConfig) -> Result<Self> {
        config.validate()?;
        let next_delay_secs = config.base_delay.as_secs_f64();
        Ok(ExponentialBackoff {
            config,
            next_delay_secs,
        })
    }

    /// A backoff following [`DEFAULT_EXPONENTIAL_CONFIG`].
    pub(crate) fn with_defaults() -> Self {
        ExponentialBackoff {
            config: DEFAULT_EXPONENTIAL_CONFIG,
            next_delay_secs: DEFAULT_EXPONENTIAL_CONFIG.base_delay.as_secs_f64(),
        }
    }

    /// Forgets previous failures.
    pub(crate) fn reset(&mut self) {
        self.next_delay_secs = self.config.base_delay.as_secs_f64();
    }

    /// Returns the delay to wait before the next attempt and grows the
    /// following one.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.next_delay_secs;
        let jittered = if self.config.jitter > 0.0 {
            delay * (1.0 + self.config.jitter * rand::rng().random_range(-1.0..1.0))
        } else {
            delay
        };
        self.next_delay_secs =
            (delay * self.config.multiplier).min(self.config.max_delay.as_secs_f64());
        Duration::from_secs_f64(jittered)
    }
}

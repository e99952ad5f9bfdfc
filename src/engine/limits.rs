// SPDX-License-Identifier: Apache-2.0

//! Timeouts and cancellation for the blocking points of a call
//!
//! A call can wait on the network in three places: dialing, probing and
//! pulling the next row. Each wait goes through [`Limits::guard`], which
//! races it against the phase timeout and an optional cancellation token.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::error::{EngineError, EngineResult};

/// Where a call is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Dial,
    Probe,
    Fetch,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Dial => "dial",
            Phase::Probe => "probe",
            Phase::Fetch => "fetch",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Limits {
    pub dial: Option<Duration>,
    pub probe: Option<Duration>,
    pub fetch: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Limits {
    /// No timeouts, no cancellation.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Same timeouts, no cancellation token. For cleanup work that has to
    /// run after the call was cancelled.
    pub fn detached(&self) -> Self {
        Self {
            cancel: None,
            ..self.clone()
        }
    }

    pub fn timeout_for(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::Dial => self.dial,
            Phase::Probe => self.probe,
            Phase::Fetch => self.fetch,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// Awaits `fut` unless the phase deadline passes or the call is
    /// cancelled first.
    pub async fn guard<T, F>(&self, phase: Phase, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        let bounded = async {
            match self.timeout_for(phase) {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::Timeout {
                        phase: phase.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    }),
                },
                None => fut.await,
            }
        };

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(EngineError::Cancelled),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        }
    }
}

//! # Fault Injection
//!
//! Provider-keyed registry that, when armed, forces the next matching call to
//! fail in a specified way. Used only by test and chaos harnesses; production
//! paths see an empty registry.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// How an armed fault presents to the caller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Timeout,
    Http500,
    Http503,
    NetworkError,
}

/// The simulated provider failure
#[derive(Debug, thiserror::Error)]
pub enum InjectedFault {
    #[error("simulated timeout")]
    Timeout,
    #[error("simulated HTTP 500 from provider")]
    Http500,
    #[error("simulated HTTP 503 from provider")]
    Http503,
    #[error("simulated network error")]
    NetworkError,
}

impl FaultKind {
    pub fn to_error(self) -> InjectedFault {
        match self {
            Self::Timeout => InjectedFault::Timeout,
            Self::Http500 => InjectedFault::Http500,
            Self::Http503 => InjectedFault::Http503,
            Self::NetworkError => InjectedFault::NetworkError,
        }
    }
}

/// Armed faults by provider name
#[derive(Default)]
pub struct FaultInjection {
    armed: Mutex<HashMap<String, FaultKind>>,
}

impl FaultInjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a fault for a provider; stays armed until disarmed.
    pub fn arm(&self, provider: &str, kind: FaultKind) {
        let mut armed = match self.armed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::warn!(provider = %provider, kind = ?kind, "arming injected fault");
        armed.insert(provider.to_string(), kind);
    }

    pub fn disarm(&self, provider: &str) {
        let mut armed = match self.armed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        armed.remove(provider);
    }

    /// The fault currently armed for a provider, if any
    pub fn peek(&self, provider: &str) -> Option<FaultKind> {
        let armed = match self.armed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        armed.get(provider).copied()
    }
}

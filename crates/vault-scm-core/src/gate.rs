//! Process-wide execution gate for the Vault client.
//!
//! At most one client process runs at a time across every poll and checkout
//! in the process. The client keeps local state (working-folder bindings,
//! cache) that concurrent invocations corrupt.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::domain::{Result, VaultScmError};

/// How long a caller waits for the gate before giving up.
pub const GATE_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

static GLOBAL_PERMITS: OnceLock<Arc<Semaphore>> = OnceLock::new();

/// Single-permit gate with a bounded acquire.
#[derive(Debug, Clone)]
pub struct ExecutionGate {
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl ExecutionGate {
    /// The gate shared by every `VaultScm` in this process.
    pub fn global() -> Self {
        let permits = GLOBAL_PERMITS.get_or_init(|| Arc::new(Semaphore::new(1)));
        Self {
            permits: Arc::clone(permits),
            acquire_timeout: GATE_ACQUIRE_TIMEOUT,
        }
    }

    /// A gate not shared with the rest of the process.
    pub fn isolated() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
            acquire_timeout: GATE_ACQUIRE_TIMEOUT,
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// Whether the permit is currently free.
    pub fn is_idle(&self) -> bool {
        self.permits.available_permits() == 1
    }

    /// Wait up to the acquire timeout for the permit.
    ///
    /// The permit is returned when the [`GatePermit`] is dropped, on every
    /// path out of the caller.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let acquire = Arc::clone(&self.permits).acquire_owned();
        match tokio::time::timeout(self.acquire_timeout, acquire).await {
            Ok(Ok(permit)) => {
                debug!("execution gate acquired");
                Ok(GatePermit { _permit: permit })
            }
            Ok(Err(_closed)) => Err(VaultScmError::GateClosed),
            Err(_elapsed) => Err(VaultScmError::GateTimeout(self.acquire_timeout)),
        }
    }
}

/// Held while a client process runs.
#[must_use = "the gate is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        debug!("execution gate released");
    }
}

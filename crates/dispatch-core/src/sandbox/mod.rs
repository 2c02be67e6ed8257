//! Fixed-size pool of `isolate` boxes with reservation, TTL, and idle
//! eviction. A single mutex guards the reserved/available bookkeeping;
//! `isolate` subprocesses are always invoked outside that lock.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::{Error, Result};

const DEFAULT_SANDBOX_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_INACTIVITY_THRESHOLD: Duration = Duration::from_secs(20 * 60);
const DEFAULT_CLEANUP_FREQUENCY: Duration = Duration::from_secs(5 * 60);

/// One OS-level isolate slot.
#[derive(Debug, Clone)]
pub struct Sandbox {
    pub id: u32,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

struct PoolState {
    reserved: HashMap<String, Sandbox>,
    available: HashSet<u32>,
}

/// Process-local singleton pool of isolate boxes.
pub struct SandboxPool {
    count: u32,
    state: Mutex<PoolState>,
    sandbox_ttl: Duration,
    inactivity_expiration_threshold: Duration,
    cleanup_frequency: Duration,
}

impl SandboxPool {
    /// Invokes `isolate --init --box-id=i` for each `i` in `[0, count)`.
    /// Slots whose init fails are excluded from the available set; the pool
    /// continues with whatever initialized successfully.
    pub async fn new(count: u32) -> Result<Self> {
        let mut available = HashSet::with_capacity(count as usize);
        for id in 0..count {
            match init_box(id).await {
                Ok(()) => {
                    available.insert(id);
                }
                Err(e) => {
                    error!(box_id = id, error = %e, "failed to initialize sandbox");
                }
            }
        }
        info!(requested = count, initialized = available.len(), "sandbox pool ready");
        Ok(Self {
            count,
            state: Mutex::new(PoolState {
                reserved: HashMap::new(),
                available,
            }),
            sandbox_ttl: DEFAULT_SANDBOX_TTL,
            inactivity_expiration_threshold: DEFAULT_INACTIVITY_THRESHOLD,
            cleanup_frequency: DEFAULT_CLEANUP_FREQUENCY,
        })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn available_count(&self) -> usize {
        self.state.lock().expect("sandbox pool mutex poisoned").available.len()
    }

    /// Picks an arbitrary available box id, moves it into `reserved[user_id]`,
    /// and stamps `expires_at`/`last_used_at`. Fails with [`Error::SandboxBusy`]
    /// if none are available.
    pub fn reserve(&self, user_id: &str) -> Result<Sandbox> {
        let mut state = self.state.lock().expect("sandbox pool mutex poisoned");
        let id = *state
            .available
            .iter()
            .min()
            .ok_or(Error::SandboxBusy)?;
        state.available.remove(&id);

        let now = Utc::now();
        let sandbox = Sandbox {
            id,
            expires_at: now + chrono::Duration::from_std(self.sandbox_ttl).unwrap(),
            last_used_at: now,
        };
        state.reserved.insert(user_id.to_string(), sandbox.clone());
        Ok(sandbox)
    }

    /// Returns the user's slot to the available set. No-op if the user holds
    /// nothing.
    pub fn release(&self, user_id: &str) {
        let mut state = self.state.lock().expect("sandbox pool mutex poisoned");
        if let Some(sandbox) = state.reserved.remove(user_id) {
            state.available.insert(sandbox.id);
        }
    }

    /// Snapshots the reserved set under lock; for each entry past its TTL or
    /// idle threshold, re-initializes the box outside the lock and releases
    /// it back to the pool.
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let expired: Vec<(String, u32)> = {
            let state = self.state.lock().expect("sandbox pool mutex poisoned");
            state
                .reserved
                .iter()
                .filter(|(_, sandbox)| {
                    now > sandbox.expires_at
                        || now
                            > sandbox.last_used_at
                                + chrono::Duration::from_std(self.inactivity_expiration_threshold).unwrap()
                })
                .map(|(user_id, sandbox)| (user_id.clone(), sandbox.id))
                .collect()
        };

        for (user_id, box_id) in expired {
            match recycle_box(box_id).await {
                Ok(()) => self.release(&user_id),
                Err(e) => warn!(box_id, error = %e, "failed to recycle sandbox during cleanup"),
            }
        }
    }

    /// Spawns a background task ticking at `cleanup_frequency`, invoking
    /// [`SandboxPool::cleanup`] on each tick.
    pub fn schedule_cleanup(self: std::sync::Arc<Self>) {
        let frequency = self.cleanup_frequency;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(frequency);
            loop {
                interval.tick().await;
                self.cleanup().await;
            }
        });
    }
}

async fn init_box(id: u32) -> Result<()> {
    run_isolate(&["--init", &format!("--box-id={}", id)]).await
}

async fn recycle_box(id: u32) -> Result<()> {
    run_isolate(&["--cleanup", &format!("--box-id={}", id)]).await?;
    run_isolate(&["--init", &format!("--box-id={}", id)]).await
}

async fn run_isolate(args: &[&str]) -> Result<()> {
    let output = Command::new("isolate")
        .args(args)
        .output()
        .await
        .map_err(Error::Io)?;
    if !output.status.success() {
        return Err(Error::execution(format!(
            "isolate {:?} exited with {}: {}",
            args,
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(count: u32, available: impl IntoIterator<Item = u32>) -> SandboxPool {
        SandboxPool {
            count,
            state: Mutex::new(PoolState {
                reserved: HashMap::new(),
                available: available.into_iter().collect(),
            }),
            sandbox_ttl: DEFAULT_SANDBOX_TTL,
            inactivity_expiration_threshold: DEFAULT_INACTIVITY_THRESHOLD,
            cleanup_frequency: DEFAULT_CLEANUP_FREQUENCY,
        }
    }

    #[test]
    fn reserve_then_release_round_trips_the_same_id() {
        let pool = pool_with(1, [0]);
        let sandbox = pool.reserve("u1").unwrap();
        assert_eq!(sandbox.id, 0);
        assert!(matches!(pool.reserve("u2"), Err(Error::SandboxBusy)));

        pool.release("u1");
        let sandbox = pool.reserve("u2").unwrap();
        assert_eq!(sandbox.id, 0);
    }

    #[test]
    fn release_of_unheld_user_is_a_no_op() {
        let pool = pool_with(1, [0]);
        pool.release("nobody");
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn accounting_invariant_holds_outside_critical_section() {
        let pool = pool_with(3, [0, 1, 2]);
        let _a = pool.reserve("u1").unwrap();
        let _b = pool.reserve("u2").unwrap();
        let state = pool.state.lock().unwrap();
        assert_eq!(state.available.len() + state.reserved.len(), 3);
        assert!(state.available.is_disjoint(
            &state.reserved.values().map(|s| s.id).collect::<HashSet<_>>()
        ));
    }
}

use crate::runtime::TenantApp;
use crate::tenant::bootstrap::TenantBootstrap;
use crate::tenant::error::TenantError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Decides whether a registry miss may initialize a tenant.
#[async_trait]
pub trait TenantGate: Send + Sync {
    /// `Err(UnknownTenant)` when no backing record exists.
    async fn admit(&self, id: &str) -> Result<(), TenantError>;

    /// Called once the tenant is Ready.
    async fn ready(&self, _id: &str) {}
}

/// Gate that admits every identifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdmitAll;

#[async_trait]
impl TenantGate for AdmitAll {
    async fn admit(&self, _id: &str) -> Result<(), TenantError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantState {
    Initializing,
    Ready,
    Failed,
    Evicting,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantStatus {
    pub name: String,
    pub state: TenantState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

type Outcome = Option<Result<Arc<dyn TenantApp>, TenantError>>;

enum Phase {
    Initializing(watch::Receiver<Outcome>),
    Ready(Arc<dyn TenantApp>),
    /// Flips to `true` once the slot is gone.
    Evicting(watch::Receiver<bool>),
}

struct Slot {
    generation: u64,
    phase: Phase,
}

#[derive(Default)]
struct Slots {
    live: HashMap<String, Slot>,
    /// Last failure per identifier, for introspection only. A failed
    /// identifier has no live slot, so the next demand starts over.
    failures: HashMap<String, TenantError>,
}

type SharedSlots = Arc<Mutex<Slots>>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// A request or sweeper hit a miss; the gate must admit the id first.
    Demand,
    /// The created event; the record is known to exist.
    Event,
}

enum Acquire {
    Lead(u64, watch::Sender<Outcome>),
    Wait(watch::Receiver<Outcome>),
    AwaitEviction(watch::Receiver<bool>),
}

enum Removal {
    Wait(watch::Receiver<Outcome>),
    Evict(u64, Arc<dyn TenantApp>, watch::Sender<bool>),
}

/// Live tenant runtimes keyed by identifier.
///
/// At most one initialization runs per identifier: the first caller on a miss
/// becomes the leader and every concurrent caller waits on its outcome. The
/// slot map lock is never held across an `.await`.
pub struct TenantRegistry {
    slots: SharedSlots,
    next_generation: AtomicU64,
    bootstrap: TenantBootstrap,
    gate: Arc<dyn TenantGate>,
    init_timeout: Duration,
}

impl TenantRegistry {
    pub fn new(bootstrap: TenantBootstrap, gate: Arc<dyn TenantGate>) -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots::default())),
            next_generation: AtomicU64::new(1),
            bootstrap,
            gate,
            init_timeout: DEFAULT_INIT_TIMEOUT,
        }
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Return the Ready runtime for `id`, initializing it on a miss.
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<dyn TenantApp>, TenantError> {
        self.acquire(id, Origin::Demand).await
    }

    /// Like [`get_or_create`](Self::get_or_create) without consulting the gate.
    pub async fn register(&self, id: &str) -> Result<Arc<dyn TenantApp>, TenantError> {
        self.acquire(id, Origin::Event).await
    }

    async fn acquire(&self, id: &str, origin: Origin) -> Result<Arc<dyn TenantApp>, TenantError> {
        loop {
            let step = {
                let mut slots = self.slots.lock();
                match slots.live.get(id) {
                    Some(Slot {
                        phase: Phase::Ready(app),
                        ..
                    }) => return Ok(app.clone()),
                    Some(Slot {
                        phase: Phase::Initializing(rx),
                        ..
                    }) => Acquire::Wait(rx.clone()),
                    Some(Slot {
                        phase: Phase::Evicting(rx),
                        ..
                    }) => Acquire::AwaitEviction(rx.clone()),
                    None => {
                        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                        let (tx, rx) = watch::channel(None);
                        slots.live.insert(
                            id.to_string(),
                            Slot {
                                generation,
                                phase: Phase::Initializing(rx),
                            },
                        );
                        Acquire::Lead(generation, tx)
                    }
                }
            };

            match step {
                Acquire::Lead(generation, tx) => return self.lead(id, generation, tx, origin).await,
                Acquire::Wait(rx) => return wait_outcome(id, rx).await,
                Acquire::AwaitEviction(mut rx) => {
                    let _ = rx.wait_for(|gone| *gone).await;
                }
            }
        }
    }

    async fn lead(
        &self,
        id: &str,
        generation: u64,
        tx: watch::Sender<Outcome>,
        origin: Origin,
    ) -> Result<Arc<dyn TenantApp>, TenantError> {
        let mut guard = InitGuard {
            slots: self.slots.clone(),
            id: id.to_string(),
            generation,
            tx: Some(tx),
        };

        let outcome = match tokio::time::timeout(self.init_timeout, self.initialize(id, origin)).await {
            Ok(result) => result,
            Err(_) => Err(TenantError::timed_out(id, self.init_timeout.as_secs())),
        };

        match &outcome {
            Ok(_) => tracing::debug!("tenant {} ready (generation {})", id, generation),
            Err(e) if e.is_unknown_tenant() => tracing::debug!("registry miss for unknown tenant {}", id),
            Err(e) => tracing::warn!("{}", e),
        }
        guard.publish(outcome.clone());

        if outcome.is_ok() {
            self.gate.ready(id).await;
        }
        outcome
    }

    async fn initialize(&self, id: &str, origin: Origin) -> Result<Arc<dyn TenantApp>, TenantError> {
        if origin == Origin::Demand {
            self.gate
                .admit(id)
                .await
                .map_err(|e| e.into_initialization(id))?;
        }
        self.bootstrap.initialize(id).await
    }

    /// Stop and drop the tenant's runtime. Unknown or already-evicting ids are
    /// a no-op; an in-progress initialization is waited out first.
    pub async fn remove(&self, id: &str) {
        loop {
            let step = {
                let mut slots = self.slots.lock();
                slots.failures.remove(id);
                let Some(slot) = slots.live.get_mut(id) else {
                    return;
                };
                match &slot.phase {
                    Phase::Evicting(_) => return,
                    Phase::Initializing(rx) => Removal::Wait(rx.clone()),
                    Phase::Ready(app) => {
                        let app = app.clone();
                        let (tx, rx) = watch::channel(false);
                        slot.phase = Phase::Evicting(rx);
                        Removal::Evict(slot.generation, app, tx)
                    }
                }
            };

            match step {
                Removal::Wait(rx) => {
                    let _ = wait_outcome(id, rx).await;
                }
                Removal::Evict(generation, app, tx) => {
                    let _guard = EvictGuard {
                        slots: self.slots.clone(),
                        id: id.to_string(),
                        generation,
                        tx,
                    };
                    if let Err(e) = self.bootstrap.runtime.stop(app).await {
                        tracing::warn!("failed to stop tenant {}: {:#}", id, e);
                    }
                    tracing::info!("tenant {} evicted", id);
                    return;
                }
            }
        }
    }

    /// True when `id` is Ready or Initializing. Never creates anything.
    pub fn has(&self, id: &str) -> bool {
        matches!(
            self.state(id),
            Some(TenantState::Ready | TenantState::Initializing)
        )
    }

    pub fn state(&self, id: &str) -> Option<TenantState> {
        let slots = self.slots.lock();
        match slots.live.get(id) {
            Some(slot) => Some(phase_state(&slot.phase)),
            None if slots.failures.contains_key(id) => Some(TenantState::Failed),
            None => None,
        }
    }

    pub fn last_error(&self, id: &str) -> Option<TenantError> {
        self.slots.lock().failures.get(id).cloned()
    }

    /// All live slots plus remembered failures, sorted by name.
    pub fn snapshot(&self) -> Vec<TenantStatus> {
        let slots = self.slots.lock();
        let mut out: Vec<TenantStatus> = slots
            .live
            .iter()
            .map(|(name, slot)| TenantStatus {
                name: name.clone(),
                state: phase_state(&slot.phase),
                error: None,
            })
            .collect();
        out.extend(
            slots
                .failures
                .iter()
                .filter(|(name, _)| !slots.live.contains_key(*name))
                .map(|(name, err)| TenantStatus {
                    name: name.clone(),
                    state: TenantState::Failed,
                    error: Some(err.to_string()),
                }),
        );
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Evict every Ready tenant.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = {
            let slots = self.slots.lock();
            slots
                .live
                .iter()
                .filter(|(_, slot)| matches!(slot.phase, Phase::Ready(_)))
                .map(|(name, _)| name.clone())
                .collect()
        };
        let count = ids.len();
        for id in ids {
            self.remove(&id).await;
        }
        tracing::info!("registry shut down, {} tenant(s) stopped", count);
    }
}

fn phase_state(phase: &Phase) -> TenantState {
    match phase {
        Phase::Initializing(_) => TenantState::Initializing,
        Phase::Ready(_) => TenantState::Ready,
        Phase::Evicting(_) => TenantState::Evicting,
    }
}

async fn wait_outcome(
    id: &str,
    mut rx: watch::Receiver<Outcome>,
) -> Result<Arc<dyn TenantApp>, TenantError> {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => {
            let outcome: Outcome = (*outcome).clone();
            outcome.unwrap_or_else(|| Err(TenantError::cancelled(id)))
        }
        Err(_) => Err(TenantError::cancelled(id)),
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Owned by the leader. Publishes the outcome exactly once; if the leader is
/// dropped first, frees the slot and publishes a cancellation.
struct InitGuard {
    slots: SharedSlots,
    id: String,
    generation: u64,
    tx: Option<watch::Sender<Outcome>>,
}

impl InitGuard {
    fn publish(&mut self, outcome: Result<Arc<dyn TenantApp>, TenantError>) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        {
            let mut slots = self.slots.lock();
            let current = slots
                .live
                .get(&self.id)
                .is_some_and(|slot| slot.generation == self.generation);
            match &outcome {
                Ok(app) => {
                    slots.failures.remove(&self.id);
                    if let Some(slot) = slots.live.get_mut(&self.id).filter(|_| current) {
                        slot.phase = Phase::Ready(app.clone());
                    }
                }
                Err(e) => {
                    if current {
                        slots.live.remove(&self.id);
                    }
                    if !e.is_unknown_tenant() {
                        slots.failures.insert(self.id.clone(), e.clone());
                    }
                }
            }
        }
        tx.send_replace(Some(outcome));
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!("initialization of tenant {} was cancelled", self.id);
            let err = TenantError::cancelled(&self.id);
            self.publish(Err(err));
        }
    }
}

/// Deletes the evicting slot and wakes waiters, even if `remove` is dropped
/// mid-stop.
struct EvictGuard {
    slots: SharedSlots,
    id: String,
    generation: u64,
    tx: watch::Sender<bool>,
}

impl Drop for EvictGuard {
    fn drop(&mut self) {
        {
            let mut slots = self.slots.lock();
            if slots
                .live
                .get(&self.id)
                .is_some_and(|slot| slot.generation == self.generation)
            {
                slots.live.remove(&self.id);
            }
        }
        self.tx.send_replace(true);
    }
}

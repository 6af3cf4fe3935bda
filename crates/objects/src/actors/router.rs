//! CounterRouter - resolves a counter key to its live actor instance.
//!
//! The router owns everything that must outlive an instance: the store
//! provider, the connection registry and one [`InitGate`] per key. An
//! instance that hibernated or failed is replaced on the next request, and
//! a replacement never starts before its predecessor has terminated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use ractor::{Actor, ActorId, ActorRef, ActorStatus, SpawnErr};
use tally_core::CounterKey;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::persistence::{MigrationSet, StoreConfig, StoreProvider, counter_migrations};
use crate::virtual_objects::{Connection, ConnectionId, ConnectionRegistry, InitGate};

use super::counter::{CounterActorDef, CounterArguments};
use super::errors::CounterError;
use super::messages::{CountReply, CounterMessage};

/// Default per-connection outbound queue length.
pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

/// Resolves once an instance's task has finished, `post_stop` included.
type Termination = Shared<BoxFuture<'static, ()>>;

/// A spawned instance and the signal of its termination.
#[derive(Clone)]
struct Instance {
    actor: ActorRef<CounterMessage>,
    stopped: Termination,
}

/// Gate for one key, plus the instance it replaces.
///
/// The gate's initializer waits on `retired` before spawning, so two
/// instances of one key never run side by side.
#[derive(Default)]
struct Slot {
    gate: Arc<InitGate<Instance>>,
    retired: Option<Termination>,
}

impl Slot {
    fn replacing(previous: &Instance) -> Self {
        Self {
            gate: Arc::default(),
            retired: Some(previous.stopped.clone()),
        }
    }

    fn holds(&self, id: ActorId) -> bool {
        self.gate
            .get()
            .is_some_and(|instance| instance.actor.get_id() == id)
    }
}

/// Instance lifecycle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Idle time after which an instance stops itself. `None` keeps
    /// instances alive until evicted.
    pub hibernate_after: Option<Duration>,
    /// Outbound queue length for each streaming connection.
    pub connection_buffer: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            hibernate_after: None,
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
        }
    }
}

impl RouterConfig {
    #[must_use]
    pub const fn with_hibernate_after(mut self, idle: Duration) -> Self {
        self.hibernate_after = Some(idle);
        self
    }

    #[must_use]
    pub fn with_connection_buffer(mut self, buffer: usize) -> Self {
        self.connection_buffer = buffer.max(1);
        self
    }
}

/// Per-key resources, shared with the tasks that watch instances stop.
struct KeyResources {
    stores: StoreProvider,
    connections: ConnectionRegistry,
    slots: Mutex<HashMap<CounterKey, Slot>>,
}

impl KeyResources {
    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<CounterKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the gate, connection set and store of `key` once the instance
    /// `id` has stopped with no connection attached.
    ///
    /// Nothing is released when the key already has a newer gate.
    fn release_idle(&self, key: &CounterKey, id: ActorId) {
        let mut slots = self.slots();
        if !slots.get(key).is_some_and(|slot| slot.holds(id)) {
            return;
        }
        if !self.connections.release_if_empty(key) {
            return;
        }
        slots.remove(key);
        let store_released = self.stores.release(key);
        debug!(key = %key, store_released, "Released idle counter key");
    }

    /// Release `key` if its last instance has already terminated, or if it
    /// never had one.
    fn release_if_terminated(&self, key: &CounterKey) {
        let terminated = {
            let slots = self.slots();
            match slots.get(key) {
                None => {
                    self.connections.release_if_empty(key);
                    return;
                }
                Some(slot) => slot
                    .gate
                    .get()
                    .filter(|instance| instance.stopped.peek().is_some())
                    .map(|instance| instance.actor.get_id()),
            }
        };
        if let Some(id) = terminated {
            self.release_idle(key, id);
        }
    }
}

/// Routes requests for any key to that key's single live instance.
pub struct CounterRouter {
    resources: Arc<KeyResources>,
    migrations: MigrationSet,
    config: RouterConfig,
}

impl CounterRouter {
    /// Create a router using the built-in counter schema.
    #[must_use]
    pub fn new(store: StoreConfig, config: RouterConfig) -> Self {
        Self {
            resources: Arc::new(KeyResources {
                stores: StoreProvider::new(store),
                connections: ConnectionRegistry::new(),
                slots: Mutex::new(HashMap::new()),
            }),
            migrations: counter_migrations(),
            config,
        }
    }

    /// Replace the schema applied to every instance before it serves.
    #[must_use]
    pub fn with_migrations(mut self, migrations: MigrationSet) -> Self {
        self.migrations = migrations;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // COUNTER OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Current count of `key`, created at 0 on first access.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance cannot start or the store fails.
    pub async fn get_count(&self, key: &CounterKey) -> Result<i64, CounterError> {
        self.call(key, |reply| CounterMessage::GetCount { reply })
            .await
    }

    /// Add one to `key` and fan the new count out.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance cannot start or the write fails.
    pub async fn increment(&self, key: &CounterKey) -> Result<i64, CounterError> {
        self.call(key, |reply| CounterMessage::Increment { reply })
            .await
    }

    /// Subtract one from `key` and fan the new count out.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance cannot start or the write fails.
    pub async fn decrement(&self, key: &CounterKey) -> Result<i64, CounterError> {
        self.call(key, |reply| CounterMessage::Decrement { reply })
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STREAMING CONNECTIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Register a streaming connection on `key`.
    ///
    /// The connection receives the current count before any later update.
    /// A join the instance dropped while stopping is retried on a fresh
    /// instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance cannot start, the store fails, or
    /// the connection closed before the snapshot could be queued.
    pub async fn join(&self, key: &CounterKey, connection: Connection) -> Result<i64, CounterError> {
        self.call(key, |reply| CounterMessage::Join {
            connection: connection.clone(),
            reply,
        })
        .await
    }

    /// Remove a connection from `key`.
    ///
    /// Goes through the live instance when there is one. Otherwise the
    /// connection set is edited directly, without waking the key.
    pub async fn leave(&self, key: &CounterKey, id: ConnectionId) {
        if let Some(actor) = self.live_instance(key) {
            if actor.send_message(CounterMessage::Leave { id }).is_ok() {
                return;
            }
        }
        self.resources
            .connections
            .set_for(key)
            .lock()
            .await
            .leave(id);
        self.resources.release_if_terminated(key);
    }

    /// Echo a peer's close frame and remove the connection from `key`.
    pub async fn close(&self, key: &CounterKey, id: ConnectionId, code: u16, reason: String) {
        if let Some(actor) = self.live_instance(key) {
            let message = CounterMessage::Close {
                id,
                code,
                reason: reason.clone(),
            };
            if actor.send_message(message).is_ok() {
                return;
            }
        }
        self.resources
            .connections
            .set_for(key)
            .lock()
            .await
            .close(id, code, reason);
        self.resources.release_if_terminated(key);
    }

    /// Number of open streaming connections on `key`.
    pub async fn connection_count(&self, key: &CounterKey) -> usize {
        self.resources.connections.connection_count(key).await
    }

    /// Outbound queue length to use for new connections.
    #[must_use]
    pub const fn connection_buffer(&self) -> usize {
        self.config.connection_buffer
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INSTANCE LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Stop the instance for `key`, if one is running.
    ///
    /// State and connections are kept. The next request rehydrates once the
    /// stopped instance has terminated.
    pub fn evict(&self, key: &CounterKey) -> bool {
        let evicted = {
            let mut slots = self.resources.slots();
            let Some(instance) = slots.get(key).and_then(|slot| slot.gate.get()).cloned() else {
                return false;
            };
            slots.insert(key.clone(), Slot::replacing(&instance));
            instance
        };

        info!(key = %key, "Evicting counter instance");
        evicted.actor.stop(Some("evicted".to_string()));
        true
    }

    /// Number of keys with a running instance.
    #[must_use]
    pub fn live_instances(&self) -> usize {
        self.resources
            .slots()
            .values()
            .filter_map(|slot| slot.gate.get())
            .filter(|instance| is_alive(&instance.actor))
            .count()
    }

    /// Number of key stores currently open.
    #[must_use]
    pub fn open_stores(&self) -> usize {
        self.resources.stores.open_count()
    }

    /// Stop every instance and wait for all of them to terminate.
    pub async fn shutdown(&self) {
        let stopping = self.stop_all();
        let stopped = stopping.len();
        join_all(stopping).await;
        info!(stopped, "Counter router shut down");
    }

    /// Signal every instance to stop and return their terminations,
    /// including those of instances still being replaced.
    fn stop_all(&self) -> Vec<Termination> {
        let slots: Vec<Slot> = self.resources.slots().drain().map(|(_, slot)| slot).collect();

        slots
            .into_iter()
            .flat_map(|slot| {
                let current = slot.gate.get().map(|instance| {
                    instance.actor.stop(Some("shutdown".to_string()));
                    instance.stopped.clone()
                });
                current.into_iter().chain(slot.retired)
            })
            .collect()
    }

    /// The running instance for `key`, spawning and migrating it if needed.
    ///
    /// Concurrent callers for the same key wait on the same gate, so one
    /// instance is spawned and its migrations run once.
    async fn instance(&self, key: &CounterKey) -> Result<Instance, CounterError> {
        let instance = self.open_gate(key).await?;
        if is_alive(&instance.actor) {
            return Ok(instance);
        }

        debug!(key = %key, "Counter instance stopped, rehydrating");
        self.discard(key, &instance);
        self.open_gate(key).await
    }

    /// Open the gate for `key`.
    ///
    /// Startup runs in its own task, so a caller that goes away mid-start
    /// still leaves the new instance behind its gate.
    async fn open_gate(&self, key: &CounterKey) -> Result<Instance, CounterError> {
        let (gate, retired) = self.slot_for(key);
        if let Some(instance) = gate.get() {
            return Ok(instance.clone());
        }

        let spawner = Spawner {
            resources: Arc::clone(&self.resources),
            migrations: self.migrations.clone(),
            hibernate_after: self.config.hibernate_after,
            key: key.clone(),
        };
        tokio::spawn(async move {
            gate.open_with(|| spawner.spawn_instance(retired))
                .await
                .cloned()
        })
        .await
        .unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "Counter startup task failed");
            Err(CounterError::actor_unavailable(key))
        })
    }

    fn slot_for(&self, key: &CounterKey) -> (Arc<InitGate<Instance>>, Option<Termination>) {
        let mut slots = self.resources.slots();
        let slot = slots.entry(key.clone()).or_default();
        (Arc::clone(&slot.gate), slot.retired.clone())
    }

    fn live_instance(&self, key: &CounterKey) -> Option<ActorRef<CounterMessage>> {
        self.resources
            .slots()
            .get(key)
            .and_then(|slot| slot.gate.get())
            .map(|instance| &instance.actor)
            .filter(|actor| is_alive(actor))
            .cloned()
    }

    /// Replace the gate for `key` if it still holds `stale`.
    fn discard(&self, key: &CounterKey, stale: &Instance) {
        let mut slots = self.resources.slots();
        if slots
            .get(key)
            .is_some_and(|slot| slot.holds(stale.actor.get_id()))
        {
            slots.insert(key.clone(), Slot::replacing(stale));
        }
    }

    async fn call<F>(&self, key: &CounterKey, make: F) -> Result<i64, CounterError>
    where
        F: Fn(CountReply) -> CounterMessage,
    {
        let instance = self.instance(key).await?;
        if let Some(result) = Self::request(&instance.actor, &make).await {
            return result;
        }

        // The instance stopped between lookup and delivery; one retry.
        self.discard(key, &instance);
        let instance = self.instance(key).await?;
        Self::request(&instance.actor, &make)
            .await
            .unwrap_or_else(|| Err(CounterError::actor_unavailable(key)))
    }

    async fn request<F>(
        actor: &ActorRef<CounterMessage>,
        make: &F,
    ) -> Option<Result<i64, CounterError>>
    where
        F: Fn(CountReply) -> CounterMessage,
    {
        let (tx, rx) = oneshot::channel();
        actor.send_message(make(tx.into())).ok()?;
        rx.await.ok()
    }
}

/// Everything needed to start one instance of a key.
struct Spawner {
    resources: Arc<KeyResources>,
    migrations: MigrationSet,
    hibernate_after: Option<Duration>,
    key: CounterKey,
}

impl Spawner {
    async fn spawn_instance(&self, retired: Option<Termination>) -> Result<Instance, CounterError> {
        let key = &self.key;
        if let Some(previous) = retired {
            previous.await;
        }

        let store = self
            .resources
            .stores
            .open(key)
            .await
            .map_err(|e| CounterError::storage_failure(key, &e))?;

        let args = CounterArguments {
            key: key.clone(),
            store,
            connections: self.resources.connections.set_for(key),
            migrations: self.migrations.clone(),
            hibernate_after: self.hibernate_after,
        };

        let (actor, handle) = Actor::spawn(None, CounterActorDef, args)
            .await
            .map_err(|e| startup_error(key, e))?;

        let stopped: Termination = handle.map(|_| ()).boxed().shared();
        self.watch(actor.get_id(), stopped.clone());

        debug!(key = %key, actor = %actor.get_id(), "Counter instance spawned");
        Ok(Instance { actor, stopped })
    }

    /// Release the key's resources once the instance terminates idle.
    fn watch(&self, id: ActorId, stopped: Termination) {
        let resources = Arc::clone(&self.resources);
        let key = self.key.clone();
        tokio::spawn(async move {
            stopped.await;
            resources.release_idle(&key, id);
        });
    }
}

impl Drop for CounterRouter {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn is_alive(actor: &ActorRef<CounterMessage>) -> bool {
    matches!(
        actor.get_status(),
        ActorStatus::Starting | ActorStatus::Running | ActorStatus::Upgrading
    )
}

fn startup_error(key: &CounterKey, err: SpawnErr) -> CounterError {
    match err {
        SpawnErr::StartupFailed(inner) => inner
            .downcast_ref::<CounterError>()
            .cloned()
            .unwrap_or_else(|| CounterError::migration_failed(key, inner.to_string())),
        other => {
            warn!(key = %key, error = %other, "Counter instance failed to spawn");
            CounterError::actor_unavailable(key)
        }
    }
}

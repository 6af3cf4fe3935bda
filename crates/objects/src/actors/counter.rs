//! CounterActor - the single authoritative instance of one counter key.
//!
//! The actor migrates its store in `pre_start`, so no message is handled
//! before the schema is current. ractor delivers messages one at a time,
//! which serializes every read-modify-write on the counter row and every
//! change to the connection set.

use std::time::{Duration, Instant};

use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tally_core::CounterKey;
use tracing::{debug, info, warn};

use crate::persistence::{MigrationSet, Migrator, ObjectStore, PersistenceResult};
use crate::virtual_objects::SharedConnectionSet;

use super::errors::CounterError;
use super::messages::{CountReply, CounterMessage};

/// Shortest interval between idle checks.
const MIN_IDLE_CHECK: Duration = Duration::from_millis(10);

/// The counter actor definition.
#[derive(Clone, Default)]
pub struct CounterActorDef;

/// Arguments passed to the actor on startup.
pub struct CounterArguments {
    /// Key this instance owns.
    pub key: CounterKey,
    /// The key's durable store.
    pub store: ObjectStore,
    /// The key's connection set, shared with the registry.
    pub connections: SharedConnectionSet,
    /// Schema to apply before serving.
    pub migrations: MigrationSet,
    /// Stop after this much idle time.
    pub hibernate_after: Option<Duration>,
}

/// Actor state for one counter instance.
pub struct CounterState {
    key: CounterKey,
    store: ObjectStore,
    connections: SharedConnectionSet,
    hibernate_after: Option<Duration>,
    last_activity: Instant,
    idle_timer: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Increment,
    Decrement,
}

impl Actor for CounterActorDef {
    type Msg = CounterMessage;
    type State = CounterState;
    type Arguments = CounterArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        debug!(key = %args.key, "CounterActor starting");

        let report = Migrator::apply_all(&args.store, &args.migrations)
            .await
            .map_err(|e| CounterError::migration_failed(&args.key, e.to_string()))?;

        let idle_timer = args.hibernate_after.map(|limit| {
            let period = limit.checked_div(4).unwrap_or(limit).max(MIN_IDLE_CHECK);
            myself.send_interval(period, || CounterMessage::IdleCheck)
        });

        info!(
            key = %args.key,
            applied = ?report.applied,
            "CounterActor ready"
        );

        Ok(CounterState {
            key: args.key,
            store: args.store,
            connections: args.connections,
            hibernate_after: args.hibernate_after,
            last_activity: Instant::now(),
            idle_timer,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(timer) = state.idle_timer.take() {
            timer.abort();
        }
        debug!(key = %state.key, "CounterActor stopped");
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if !matches!(message, CounterMessage::IdleCheck) {
            state.last_activity = Instant::now();
        }

        match message {
            CounterMessage::GetCount { reply } => {
                let result = state
                    .store
                    .get_or_create()
                    .await
                    .map_err(|e| CounterError::storage_failure(&state.key, &e));
                Self::reply(&state.key, reply, result);
            }

            CounterMessage::Increment { reply } => {
                let result = Self::handle_mutation(state, Mutation::Increment).await;
                Self::reply(&state.key, reply, result);
            }

            CounterMessage::Decrement { reply } => {
                let result = Self::handle_mutation(state, Mutation::Decrement).await;
                Self::reply(&state.key, reply, result);
            }

            CounterMessage::Join { connection, reply } => {
                let result = Self::handle_join(state, connection).await;
                Self::reply(&state.key, reply, result);
            }

            CounterMessage::Leave { id } => {
                state.connections.lock().await.leave(id);
            }

            CounterMessage::Close { id, code, reason } => {
                if state.connections.lock().await.close(id, code, reason) {
                    debug!(key = %state.key, connection = %id, code, "Connection closed by peer");
                }
            }

            CounterMessage::IdleCheck => {
                if let Some(limit) = state.hibernate_after {
                    if state.last_activity.elapsed() >= limit {
                        info!(key = %state.key, idle = ?limit, "CounterActor hibernating");
                        myself.stop(Some("hibernate".to_string()));
                    }
                }
            }
        }

        Ok(())
    }
}

impl CounterActorDef {
    /// Persist a mutation, then fan the committed value out.
    ///
    /// Nothing is broadcast when the write fails.
    async fn handle_mutation(
        state: &mut CounterState,
        mutation: Mutation,
    ) -> Result<i64, CounterError> {
        let written: PersistenceResult<i64> = match mutation {
            Mutation::Increment => state.store.increment().await,
            Mutation::Decrement => state.store.decrement().await,
        };
        let count = written.map_err(|e| {
            warn!(key = %state.key, error = %e, ?mutation, "Counter write failed");
            CounterError::storage_failure(&state.key, &e)
        })?;

        let report = state.connections.lock().await.broadcast(count);
        debug!(
            key = %state.key,
            count,
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "Fanned out counter update"
        );

        Ok(count)
    }

    async fn handle_join(
        state: &mut CounterState,
        connection: crate::virtual_objects::Connection,
    ) -> Result<i64, CounterError> {
        let count = state
            .store
            .get_or_create()
            .await
            .map_err(|e| CounterError::storage_failure(&state.key, &e))?;

        state
            .connections
            .lock()
            .await
            .join(connection, count)
            .map_err(|_| CounterError::connection_closed(&state.key))?;

        Ok(count)
    }

    fn reply(key: &CounterKey, reply: CountReply, result: Result<i64, CounterError>) {
        if reply.send(result).is_err() {
            debug!(key = %key, "Caller went away before the reply");
        }
    }
}

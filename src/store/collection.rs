//! A cached entity collection and the CRUD operations on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::backend::{Backend, Record};
use crate::errors::{AppError, StoreError};
use crate::realtime::{ChangeEvent, Table};

/// Observable state of one collection.
#[derive(Debug, Clone)]
pub struct CollectionState<R> {
    pub rows: Arc<Vec<R>>,
    /// `true` until the first fetch resolved, successfully or not.
    pub loading: bool,
    /// Ticket of the fetch whose rows are held.
    applied: u64,
}

impl<R> CollectionState<R> {
    fn empty() -> Self {
        Self {
            rows: Arc::new(Vec::new()),
            loading: true,
            applied: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn applied(&self) -> u64 {
        self.applied
    }
}

/// The cached rows of one table plus its mutation operations.
///
/// Mutations do not touch the cached rows; the collection changes only when a fetch completes,
/// normally one triggered by the change feed.
pub struct EntityStore<R: Record, B> {
    backend: Arc<B>,
    state: Arc<watch::Sender<CollectionState<R>>>,
    tickets: Arc<AtomicU64>,
}

impl<R: Record, B> Clone for EntityStore<R, B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
            tickets: Arc::clone(&self.tickets),
        }
    }
}

impl<R, B> EntityStore<R, B>
where
    R: Record,
    B: Backend<R>,
{
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: Arc::new(watch::Sender::new(CollectionState::empty())),
            tickets: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn table(&self) -> Table {
        R::TABLE
    }

    /// Current rows.
    pub fn rows(&self) -> Arc<Vec<R>> {
        Arc::clone(&self.state.borrow().rows)
    }

    /// One cached row.
    pub fn get(&self, id: &str) -> Option<R> {
        self.state.borrow().rows.iter().find(|row| row.id() == id).cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Observe every replacement of the collection.
    pub fn watch(&self) -> watch::Receiver<CollectionState<R>> {
        self.state.subscribe()
    }

    /// Reload every row from the backend.
    ///
    /// On failure the cached rows stay as they were. A fetch that started before another one
    /// already applied its result is discarded.
    pub async fn fetch_all(&self) -> Result<(), StoreError> {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let table = R::TABLE;

        match <B as Backend<R>>::fetch_all(&self.backend).await {
            Ok(rows) => {
                let count = rows.len();
                let mut rows = Some(rows);
                let applied = self.state.send_if_modified(|state| {
                    let was_loading = std::mem::replace(&mut state.loading, false);
                    if ticket <= state.applied {
                        return was_loading;
                    }
                    state.applied = ticket;
                    state.rows = Arc::new(rows.take().unwrap_or_default());
                    true
                });
                if rows.is_some() {
                    tracing::debug!(%table, ticket, "Discarded out-of-order fetch");
                } else {
                    tracing::debug!(%table, count, applied, "Collection refreshed");
                }
                Ok(())
            }
            Err(source) => {
                self.state.send_if_modified(|state| {
                    std::mem::replace(&mut state.loading, false)
                });
                Err(self.failed("fetch", source))
            }
        }
    }

    /// Insert one row. The collection picks it up on the next refresh.
    pub async fn add(&self, payload: &R::Create) -> Result<R, StoreError> {
        <B as Backend<R>>::insert(&self.backend, payload)
            .await
            .map_err(|source| self.failed("add", source))
    }

    /// Partially update one row.
    pub async fn update(&self, id: &str, patch: &R::Update) -> Result<R, StoreError> {
        <B as Backend<R>>::update(&self.backend, id, patch)
            .await
            .map_err(|source| self.failed("update", source))
    }

    /// Delete one row.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        <B as Backend<R>>::delete(&self.backend, id)
            .await
            .map_err(|source| self.failed("delete", source))
    }

    /// Refetch on every change event until the subscription is dropped.
    pub fn subscribe(&self, mut events: broadcast::Receiver<ChangeEvent>) -> Subscription {
        let store = self.clone();
        let table = R::TABLE;

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        tracing::trace!(%table, id = %event.id, kind = ?event.kind, "Change received");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(%table, skipped, "Change channel lagged, refetching");
                    }
                    Err(RecvError::Closed) => break,
                }

                // One fetch covers everything already queued.
                loop {
                    match events.try_recv() {
                        Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                    }
                }

                // Failures are logged by fetch_all and the cached rows stay.
                store.fetch_all().await.ok();
            }
            tracing::debug!(%table, "Change channel closed");
        });

        Subscription { table, handle }
    }

    fn failed(&self, operation: &'static str, source: AppError) -> StoreError {
        tracing::warn!(table = %R::TABLE, operation, error = %source, "Backend call failed");
        StoreError::Backend {
            table: R::TABLE,
            source,
        }
    }
}

/// A live change-feed subscription. Dropping it stops the refresh task.
#[derive(Debug)]
pub struct Subscription {
    table: Table,
    handle: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
        tracing::trace!(table = %self.table, "Subscription released");
    }
}

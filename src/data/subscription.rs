//! Live queries over the document store
//!
//! A [`Subscription`] is a lazy, infinite, restartable sequence of snapshots
//! of one query. Nothing is read until the first [`Subscription::next`];
//! after that each call waits for a batch that touches the query and then
//! re-reads it. Delivery stops once the subscription is cancelled through
//! its [`SubscriptionHandle`].

use std::sync::Arc;

use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

use super::store::*;

/// What a subscription watches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveQuery {
    Document(DocumentPath),
    Collection {
        collection: CollectionRef,
        limit: usize,
    },
}

impl LiveQuery {
    fn is_affected_by(&self, event: &ChangeEvent) -> bool {
        match self {
            Self::Document(path) => event.touches(path),
            Self::Collection { collection, .. } => event.touches_collection(collection),
        }
    }
}

/// Result set of a query at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Position in this subscription's sequence, starting at 1
    pub sequence: u64,
    pub documents: Vec<Document>,
}

/// Entry point for live queries
#[derive(Clone)]
pub struct LiveFeed {
    store: Arc<dyn DocumentStore>,
}

impl LiveFeed {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Start watching `query`.
    ///
    /// Changes are captured from this call on, but the first read happens
    /// on the first poll.
    pub fn subscribe(&self, query: LiveQuery) -> Subscription {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        crate::metrics::SUBSCRIPTIONS_ACTIVE.inc();
        tracing::debug!(?query, "Subscription opened");

        Subscription {
            store: Arc::clone(&self.store),
            changes: self.store.subscribe_changes(),
            query,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            pending_initial: true,
            sequence: 0,
        }
    }
}

/// Cancels a subscription, possibly from another task
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl SubscriptionHandle {
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Sequence of snapshots of one [`LiveQuery`]
pub struct Subscription {
    store: Arc<dyn DocumentStore>,
    changes: broadcast::Receiver<ChangeEvent>,
    query: LiveQuery,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    pending_initial: bool,
    sequence: u64,
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: cancellation can no longer happen.
            std::future::pending::<()>().await;
        }
    }
}

impl Subscription {
    pub fn query(&self) -> &LiveQuery {
        &self.query
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            cancel: Arc::clone(&self.cancel_tx),
        }
    }

    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Deliver the current snapshot again on the next poll.
    pub fn restart(&mut self) {
        self.pending_initial = true;
    }

    /// Next snapshot, or `None` once cancelled.
    pub async fn next(&mut self) -> Option<Result<Snapshot, StoreError>> {
        if self.is_cancelled() {
            return None;
        }

        if !self.pending_initial {
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled(&mut self.cancel_rx) => return None,
                    received = self.changes.recv() => match received {
                        Ok(event) if self.query.is_affected_by(&event) => break,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            // Missed events may have touched us; re-read.
                            tracing::debug!(skipped, "Subscription lagged behind change feed");
                            break;
                        }
                        Err(RecvError::Closed) => return None,
                    },
                }
            }
        }

        self.pending_initial = false;
        self.sequence += 1;
        let sequence = self.sequence;
        Some(
            self.read()
                .await
                .map(|documents| Snapshot { sequence, documents }),
        )
    }

    async fn read(&self) -> Result<Vec<Document>, StoreError> {
        match &self.query {
            LiveQuery::Document(path) => Ok(self
                .store
                .read_document(path)
                .await?
                .into_iter()
                .collect()),
            LiveQuery::Collection { collection, limit } => {
                self.store.list_documents(collection, *limit).await
            }
        }
    }

    /// Adapt into a [`Stream`] that ends when the subscription is cancelled.
    pub fn into_stream(self) -> impl Stream<Item = Result<Snapshot, StoreError>> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|snapshot| (snapshot, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        crate::metrics::SUBSCRIPTIONS_ACTIVE.dec();
        tracing::debug!(query = ?self.query, "Subscription closed");
    }
}

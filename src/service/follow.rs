//! Follow graph service
//!
//! Every mutation is a single atomic batch: both views of the edge plus the
//! two denormalized counters. With [`CounterPolicy::Guarded`] the batch is
//! conditional on the outbound edge, checked inside the same transaction, so
//! `follow` on an existing edge and `unfollow` on a missing one change
//! nothing. [`CounterPolicy::Blind`] reproduces the legacy client, which
//! always wrote and always incremented.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::clamp_limit;
use crate::config::{CounterPolicy, GraphConfig};
use crate::data::{
    CollectionRef, CommitOutcome, CounterField, Document, DocumentPath, DocumentStore,
    EdgeDocument, FollowCounters, FollowEdge, Presence, UserId, WriteBatch,
};
use crate::error::AppError;
use crate::metrics::{COUNTER_DRIFT_DETECTED_TOTAL, record_follow_operation};

/// Whether a mutation changed the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowChange {
    Applied,
    /// The relationship was already in the requested state.
    Unchanged,
}

/// Relationship between the actor and another user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub following: bool,
    pub followed_by: bool,
}

/// Stored counters compared with the edges actually present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterAudit {
    pub stored: FollowCounters,
    pub actual: FollowCounters,
}

impl CounterAudit {
    pub fn is_consistent(&self) -> bool {
        self.stored == self.actual
    }
}

fn require_actor(actor: Option<&UserId>) -> Result<&UserId, AppError> {
    actor.ok_or(AppError::Unauthorized)
}

fn reject_self(actor: &UserId, target: &UserId, verb: &str) -> Result<(), AppError> {
    if actor == target {
        return Err(AppError::InvalidOperation(format!("cannot {verb} yourself")));
    }
    Ok(())
}

/// Follow graph service
pub struct FollowGraphService {
    store: Arc<dyn DocumentStore>,
    policy: CounterPolicy,
    max_page_size: usize,
}

impl FollowGraphService {
    /// Create new follow graph service
    pub fn new(store: Arc<dyn DocumentStore>, config: &GraphConfig) -> Self {
        Self {
            store,
            policy: config.counter_policy,
            max_page_size: config.max_page_size,
        }
    }

    pub fn policy(&self) -> CounterPolicy {
        self.policy
    }

    /// `actor` starts following `target`.
    ///
    /// # Errors
    /// - `Unauthorized` without an actor
    /// - `InvalidOperation` when following yourself
    /// - `Store` when the transaction fails (e.g. `target` has no profile);
    ///   nothing is written in that case
    pub async fn follow(
        &self,
        actor: Option<&UserId>,
        target: &UserId,
    ) -> Result<FollowChange, AppError> {
        let actor = require_actor(actor)?;
        if let Err(error) = reject_self(actor, target, "follow") {
            record_follow_operation("follow", "rejected");
            return Err(error);
        }

        let followed_at = Utc::now();
        let outbound = DocumentPath::outbound(actor, target);
        let mut batch = WriteBatch::new();
        if self.policy == CounterPolicy::Guarded {
            batch = batch.guarded(outbound.clone(), Presence::Absent);
        }
        let batch = batch
            .set(
                outbound,
                Document::Edge(EdgeDocument {
                    uid: target.clone(),
                    followed_at,
                }),
            )
            .set(
                DocumentPath::inbound(actor, target),
                Document::Edge(EdgeDocument {
                    uid: actor.clone(),
                    followed_at,
                }),
            )
            .increment(DocumentPath::User(actor.clone()), CounterField::Following, 1)
            .increment(DocumentPath::User(target.clone()), CounterField::Followers, 1);

        self.commit("follow", actor, target, batch).await
    }

    /// `actor` stops following `target`.
    pub async fn unfollow(
        &self,
        actor: Option<&UserId>,
        target: &UserId,
    ) -> Result<FollowChange, AppError> {
        let actor = require_actor(actor)?;
        if let Err(error) = reject_self(actor, target, "unfollow") {
            record_follow_operation("unfollow", "rejected");
            return Err(error);
        }

        let outbound = DocumentPath::outbound(actor, target);
        let mut batch = WriteBatch::new();
        if self.policy == CounterPolicy::Guarded {
            batch = batch.guarded(outbound.clone(), Presence::Present);
        }
        let batch = batch
            .delete(outbound)
            .delete(DocumentPath::inbound(actor, target))
            .increment(DocumentPath::User(actor.clone()), CounterField::Following, -1)
            .increment(DocumentPath::User(target.clone()), CounterField::Followers, -1);

        self.commit("unfollow", actor, target, batch).await
    }

    async fn commit(
        &self,
        operation: &'static str,
        actor: &UserId,
        target: &UserId,
        batch: WriteBatch,
    ) -> Result<FollowChange, AppError> {
        match self.store.transactional_write(batch).await {
            Ok(CommitOutcome::Applied) => {
                record_follow_operation(operation, "applied");
                tracing::info!(%actor, %target, operation, "Follow graph updated");
                Ok(FollowChange::Applied)
            }
            Ok(CommitOutcome::GuardRejected) => {
                record_follow_operation(operation, "unchanged");
                tracing::debug!(
                    %actor,
                    %target,
                    operation,
                    "Relationship already in requested state"
                );
                Ok(FollowChange::Unchanged)
            }
            Err(error) => {
                record_follow_operation(operation, "error");
                tracing::warn!(%actor, %target, operation, %error, "Follow graph update failed");
                Err(error.into())
            }
        }
    }

    /// Whether `actor` follows `target`. `false` without an actor.
    pub async fn is_following(
        &self,
        actor: Option<&UserId>,
        target: &UserId,
    ) -> Result<bool, AppError> {
        let Some(actor) = actor else {
            return Ok(false);
        };
        let edge = self
            .store
            .read_document(&DocumentPath::outbound(actor, target))
            .await?;
        Ok(edge.is_some())
    }

    /// Both directions between `actor` and `target`.
    pub async fn relationship(
        &self,
        actor: Option<&UserId>,
        target: &UserId,
    ) -> Result<Relationship, AppError> {
        let Some(actor) = actor else {
            return Ok(Relationship {
                following: false,
                followed_by: false,
            });
        };
        let (following, followed_by) = tokio::try_join!(
            self.is_following(Some(actor), target),
            self.is_following(Some(target), actor),
        )?;
        Ok(Relationship {
            following,
            followed_by,
        })
    }

    /// Users following `user`, newest first.
    pub async fn followers(
        &self,
        user: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<FollowEdge>, AppError> {
        let collection = CollectionRef::MyFollowers(user.clone());
        let documents = self
            .store
            .list_documents(&collection, clamp_limit(limit, self.max_page_size))
            .await?;
        Ok(documents
            .into_iter()
            .filter_map(|document| match document {
                Document::Edge(edge) => Some(FollowEdge {
                    follower_id: edge.uid,
                    followee_id: user.clone(),
                    followed_at: edge.followed_at,
                }),
                _ => None,
            })
            .collect())
    }

    /// Users `user` follows, newest first.
    pub async fn following(
        &self,
        user: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<FollowEdge>, AppError> {
        let collection = CollectionRef::MyFollowing(user.clone());
        let documents = self
            .store
            .list_documents(&collection, clamp_limit(limit, self.max_page_size))
            .await?;
        Ok(documents
            .into_iter()
            .filter_map(|document| match document {
                Document::Edge(edge) => Some(FollowEdge {
                    follower_id: user.clone(),
                    followee_id: edge.uid,
                    followed_at: edge.followed_at,
                }),
                _ => None,
            })
            .collect())
    }

    /// Stored counters of `user`.
    pub async fn counters(&self, user: &UserId) -> Result<FollowCounters, AppError> {
        match self
            .store
            .read_document(&DocumentPath::User(user.clone()))
            .await?
        {
            Some(Document::User(profile)) => Ok(profile.counters()),
            _ => Err(AppError::NotFound),
        }
    }

    /// Compare stored counters with the number of edges. Never repairs.
    pub async fn audit_counters(&self, user: &UserId) -> Result<CounterAudit, AppError> {
        let stored = self.counters(user).await?;
        let inbound = CollectionRef::MyFollowers(user.clone());
        let outbound = CollectionRef::MyFollowing(user.clone());
        let (followers, following) = tokio::try_join!(
            self.store.count_documents(&inbound),
            self.store.count_documents(&outbound),
        )?;
        let audit = CounterAudit {
            stored,
            actual: FollowCounters {
                followers,
                following,
            },
        };

        if audit.stored.followers != audit.actual.followers {
            COUNTER_DRIFT_DETECTED_TOTAL
                .with_label_values(&["followers"])
                .inc();
        }
        if audit.stored.following != audit.actual.following {
            COUNTER_DRIFT_DETECTED_TOTAL
                .with_label_values(&["following"])
                .inc();
        }
        if !audit.is_consistent() {
            tracing::warn!(user = %user, ?audit, "Follow counters drifted from edges");
        }

        Ok(audit)
    }
}

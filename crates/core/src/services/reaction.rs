//! Reaction ledger.
//!
//! Each user holds at most one reaction per post. Toggling is applied to the
//! local tallies first and then reconciled with the store as a delete of the
//! user's existing row followed by an insert of the new one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use geofeed_common::{AppError, AppResult, IdGenerator};
use geofeed_db::entities::reaction;
use serde::Serialize;

use crate::services::optimistic;
use crate::services::store::{ReactionStore, Stores};

/// The emoji a post can be reacted with.
pub const REACTION_EMOJIS: [&str; 6] = ["❤️", "🔥", "😂", "😮", "😢", "👏"];

/// Whether `emoji` is one of [`REACTION_EMOJIS`].
#[must_use]
pub fn is_supported(emoji: &str) -> bool {
    REACTION_EMOJIS.contains(&emoji)
}

/// Per-emoji reaction counts for one post.
///
/// Entries that drop to zero are kept, but compare equal to absent ones.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ReactionCounts(BTreeMap<String, u64>);

impl ReactionCounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, emoji: &str) -> u64 {
        self.0.get(emoji).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, emoji: &str) {
        *self.0.entry(emoji.to_string()).or_insert(0) += 1;
    }

    /// Decrement, never going below zero.
    pub fn decrement(&mut self, emoji: &str) {
        let count = self.0.entry(emoji.to_string()).or_insert(0);
        *count = count.saturating_sub(1);
    }

    /// Sum over every emoji.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Non-zero counts in emoji order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(emoji, count)| (emoji.as_str(), *count))
    }
}

impl PartialEq for ReactionCounts {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for ReactionCounts {}

impl<S: Into<String>> FromIterator<(S, u64)> for ReactionCounts {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(e, c)| (e.into(), c)).collect())
    }
}

/// Tallies for one post plus the viewer's own reaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReactionState {
    pub counts: ReactionCounts,
    pub user_reaction: Option<String>,
}

impl ReactionState {
    /// Fold the reaction rows of a single post from `viewer_id`'s perspective.
    #[must_use]
    pub fn from_rows<'a>(
        rows: impl IntoIterator<Item = &'a reaction::Model>,
        viewer_id: &str,
    ) -> Self {
        let mut state = Self::default();
        for row in rows {
            state.counts.increment(&row.emoji);
            if row.user_id == viewer_id {
                state.user_reaction = Some(row.emoji.clone());
            }
        }
        state
    }

    /// The state after the viewer toggles `emoji`.
    ///
    /// Toggling the current reaction clears it; any other emoji replaces it.
    #[must_use]
    pub fn toggled(&self, emoji: &str) -> Self {
        let mut next = self.clone();

        if self.user_reaction.as_deref() == Some(emoji) {
            next.counts.decrement(emoji);
            next.user_reaction = None;
            return next;
        }

        if let Some(previous) = &self.user_reaction {
            next.counts.decrement(previous);
        }
        next.counts.increment(emoji);
        next.user_reaction = Some(emoji.to_string());
        next
    }
}

/// Group reaction rows by post and fold each group for `viewer_id`.
#[must_use]
pub fn fold_by_post(rows: &[reaction::Model], viewer_id: &str) -> HashMap<String, ReactionState> {
    let mut grouped: HashMap<&str, Vec<&reaction::Model>> = HashMap::new();
    for row in rows {
        grouped.entry(row.post_id.as_str()).or_default().push(row);
    }

    grouped
        .into_iter()
        .map(|(post_id, rows)| (post_id.to_string(), ReactionState::from_rows(rows, viewer_id)))
        .collect()
}

/// Reaction service for business logic.
#[derive(Clone)]
pub struct ReactionService {
    reactions: Arc<dyn ReactionStore>,
    id_gen: IdGenerator,
}

impl ReactionService {
    #[must_use]
    pub fn new(stores: &Stores) -> Self {
        Self {
            reactions: Arc::clone(&stores.reactions),
            id_gen: IdGenerator::new(),
        }
    }

    /// Toggle `emoji` on `post_id` for `viewer_id`.
    ///
    /// `state` is updated before the store is contacted and restored to its
    /// exact previous value if reconciliation fails.
    pub async fn toggle(
        &self,
        post_id: &str,
        viewer_id: &str,
        emoji: &str,
        state: &mut ReactionState,
    ) -> AppResult<()> {
        if !is_supported(emoji) {
            return Err(AppError::BadRequest(format!("Unsupported reaction: {emoji}")));
        }

        let previous = state.user_reaction.clone();
        let next = state.toggled(emoji);
        let wanted = next.user_reaction.clone();

        optimistic::apply(
            state,
            |s| *s = next,
            self.reconcile(post_id, viewer_id, previous, wanted),
        )
        .await
    }

    async fn reconcile(
        &self,
        post_id: &str,
        viewer_id: &str,
        previous: Option<String>,
        wanted: Option<String>,
    ) -> AppResult<()> {
        let removed = self.reactions.delete_reaction(post_id, viewer_id).await?;
        tracing::debug!(post_id, viewer_id, removed, "Cleared reaction");

        let Some(emoji) = wanted else {
            return Ok(());
        };

        let err = match self
            .reactions
            .insert_reaction(self.row(post_id, viewer_id, &emoji))
            .await
        {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };

        // The delete already went through; try to put the old reaction back
        if let Some(previous) = previous {
            if let Err(restore_err) = self
                .reactions
                .insert_reaction(self.row(post_id, viewer_id, &previous))
                .await
            {
                tracing::warn!(
                    post_id,
                    viewer_id,
                    error = %restore_err,
                    "Failed to restore previous reaction"
                );
            }
        }

        Err(err)
    }

    fn row(&self, post_id: &str, user_id: &str, emoji: &str) -> reaction::Model {
        reaction::Model {
            id: self.id_gen.generate(),
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            emoji: emoji.to_string(),
            created_at: Utc::now().into(),
        }
    }
}

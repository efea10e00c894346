//! Comment threads.
//!
//! Comments are stored flat with an optional parent id. [`layout`] turns
//! them into display order: each top-level comment followed by its replies,
//! chronological at every level, and never indented more than once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use geofeed_common::{AppResult, IdGenerator};
use geofeed_db::entities::comment;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::services::store::{CommentStore, ProfileStore, Stores};

/// Shown when a username cannot be resolved.
pub const UNKNOWN_USERNAME: &str = "unknown";

/// Whether a thread entry is a top-level comment or a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Top,
    Reply,
}

/// One line of a laid-out thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadEntry {
    pub comment: comment::Model,
    pub author_username: String,
    pub kind: EntryKind,
    /// Author of the comment being replied to; only set for replies.
    pub parent_username: Option<String>,
}

fn chronological(a: &&comment::Model, b: &&comment::Model) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Order `comments` for display.
///
/// `usernames` maps user ids to usernames. Replies whose parent is missing
/// from `comments` are placed at the end, attributed to [`UNKNOWN_USERNAME`].
#[must_use]
pub fn layout(comments: &[comment::Model], usernames: &HashMap<String, String>) -> Vec<ThreadEntry> {
    let by_id: HashMap<&str, &comment::Model> =
        comments.iter().map(|c| (c.id.as_str(), c)).collect();

    let username = |user_id: &str| {
        usernames
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_USERNAME.to_string())
    };
    let parent_username = |c: &comment::Model| {
        c.parent_id
            .as_deref()
            .and_then(|id| by_id.get(id))
            .map_or_else(|| UNKNOWN_USERNAME.to_string(), |p| username(&p.user_id))
    };
    let entry = |c: &comment::Model, kind: EntryKind| ThreadEntry {
        comment: c.clone(),
        author_username: username(&c.user_id),
        kind,
        parent_username: match kind {
            EntryKind::Top => None,
            EntryKind::Reply => Some(parent_username(c)),
        },
    };

    let mut tops: Vec<&comment::Model> = Vec::new();
    let mut replies: HashMap<&str, Vec<&comment::Model>> = HashMap::new();
    for c in comments {
        match c.parent_id.as_deref() {
            None => tops.push(c),
            Some(parent) => replies.entry(parent).or_default().push(c),
        }
    }
    tops.sort_by(chronological);
    for group in replies.values_mut() {
        group.sort_by(chronological);
    }

    let mut out = Vec::with_capacity(comments.len());
    let mut visited: HashSet<&str> = HashSet::new();

    for top in tops {
        visited.insert(top.id.as_str());
        out.push(entry(top, EntryKind::Top));

        // Depth-first so a reply to a reply follows its own parent
        let mut stack: Vec<&comment::Model> = replies
            .get(top.id.as_str())
            .map(|g| g.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(reply) = stack.pop() {
            if !visited.insert(reply.id.as_str()) {
                continue;
            }
            out.push(entry(reply, EntryKind::Reply));
            if let Some(children) = replies.get(reply.id.as_str()) {
                stack.extend(children.iter().rev().copied());
            }
        }
    }

    // Orphans and anything caught in a parent cycle
    let mut leftover: Vec<&comment::Model> = comments
        .iter()
        .filter(|c| !visited.contains(c.id.as_str()))
        .collect();
    leftover.sort_by(chronological);
    out.extend(leftover.into_iter().map(|c| entry(c, EntryKind::Reply)));

    out
}

/// Input for posting a comment.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentInput {
    pub post_id: String,

    #[validate(length(min = 1, max = 500))]
    pub content: String,

    /// Comment being replied to, on the same post.
    pub reply_to_id: Option<String>,
}

/// Comment service for business logic.
#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentStore>,
    profiles: Arc<dyn ProfileStore>,
    id_gen: IdGenerator,
}

impl CommentService {
    #[must_use]
    pub fn new(stores: &Stores) -> Self {
        Self {
            comments: Arc::clone(&stores.comments),
            profiles: Arc::clone(&stores.profiles),
            id_gen: IdGenerator::new(),
        }
    }

    /// Fetch and lay out every comment on `post_id`.
    pub async fn thread(&self, post_id: &str) -> AppResult<Vec<ThreadEntry>> {
        let comments = self.comments.comments_for_post(post_id).await?;

        let mut user_ids: Vec<String> = comments.iter().map(|c| c.user_id.clone()).collect();
        user_ids.sort();
        user_ids.dedup();

        let usernames: HashMap<String, String> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            self.profiles
                .find_profiles(&user_ids)
                .await?
                .into_iter()
                .map(|p| (p.id, p.username))
                .collect()
        };

        tracing::debug!(post_id, comments = comments.len(), "Loaded comment thread");
        Ok(layout(&comments, &usernames))
    }

    /// Post a comment as `user_id`. Callers re-run [`thread`](Self::thread) afterwards.
    pub async fn post(&self, user_id: &str, mut input: CreateCommentInput) -> AppResult<comment::Model> {
        input.content = input.content.trim().to_string();
        input.validate()?;

        let model = comment::Model {
            id: self.id_gen.generate(),
            post_id: input.post_id,
            user_id: user_id.to_string(),
            content: input.content,
            parent_id: input.reply_to_id,
            created_at: Utc::now().into(),
        };

        let created = self.comments.insert_comment(model).await?;
        tracing::debug!(comment_id = %created.id, post_id = %created.post_id, "Posted comment");
        Ok(created)
    }

    /// Delete a comment written by `user_id`.
    pub async fn delete_comment(&self, comment_id: &str, user_id: &str) -> AppResult<()> {
        self.comments.delete_comment(comment_id, user_id).await
    }
}

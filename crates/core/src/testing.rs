//! In-memory store and row builders for tests.
//!
//! [`InMemoryStore`] implements every store trait over plain vectors and
//! applies the same constraints as the database: unique usernames, one live
//! friendship edge per pair, one reaction per (post, user), ownership checks
//! on mutations and cascading deletes. Individual operations can be made to
//! fail once, and every call is counted so tests can assert on round trips.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use geofeed_common::{AppError, AppResult};
use geofeed_db::entities::{
    comment,
    friendship::{self, FriendshipStatus},
    post, reaction, user,
};

use crate::services::store::{
    CommentStore, FriendshipStore, PostStore, ProfileStore, ReactionStore,
};

/// Fixed base instant so builder timestamps are deterministic.
#[must_use]
pub fn base_time() -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
        .into()
}

/// `base_time()` shifted by `minutes`.
#[must_use]
pub fn at(minutes: i64) -> DateTime<FixedOffset> {
    base_time() + Duration::minutes(minutes)
}

#[must_use]
pub fn profile(id: &str, username: &str) -> user::Model {
    user::Model {
        id: id.to_string(),
        username: username.to_string(),
        display_name: username.to_string(),
        avatar_url: None,
        created_at: base_time(),
    }
}

#[must_use]
pub fn edge_at(
    id: &str,
    requester: &str,
    addressee: &str,
    status: FriendshipStatus,
    minutes: i64,
) -> friendship::Model {
    friendship::Model {
        id: id.to_string(),
        requester_id: requester.to_string(),
        addressee_id: addressee.to_string(),
        status,
        created_at: at(minutes),
    }
}

#[must_use]
pub fn post_at(id: &str, user_id: &str, minutes: i64) -> post::Model {
    post::Model {
        id: id.to_string(),
        user_id: user_id.to_string(),
        image_url: format!("https://cdn.example.com/{id}.jpg"),
        caption: None,
        venue_name: None,
        latitude: 40.7128,
        longitude: -74.0060,
        created_at: at(minutes),
    }
}

#[must_use]
pub fn comment_at(
    id: &str,
    post_id: &str,
    user_id: &str,
    parent_id: Option<&str>,
    minutes: i64,
) -> comment::Model {
    comment::Model {
        id: id.to_string(),
        post_id: post_id.to_string(),
        user_id: user_id.to_string(),
        content: format!("comment {id}"),
        parent_id: parent_id.map(ToString::to_string),
        created_at: at(minutes),
    }
}

#[must_use]
pub fn reaction_row(id: &str, post_id: &str, user_id: &str, emoji: &str) -> reaction::Model {
    reaction::Model {
        id: id.to_string(),
        post_id: post_id.to_string(),
        user_id: user_id.to_string(),
        emoji: emoji.to_string(),
        created_at: base_time(),
    }
}

#[derive(Default)]
struct Tables {
    users: Vec<user::Model>,
    edges: Vec<friendship::Model>,
    posts: Vec<post::Model>,
    reactions: Vec<reaction::Model>,
    comments: Vec<comment::Model>,
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    failures: Mutex<HashMap<&'static str, AppError>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call to `op` fail with `err`.
    pub fn fail_next(&self, op: &'static str, err: AppError) {
        lock(&self.failures).insert(op, err);
    }

    /// Number of calls made to `op` so far.
    #[must_use]
    pub fn calls(&self, op: &'static str) -> usize {
        lock(&self.calls).get(op).copied().unwrap_or(0)
    }

    fn enter(&self, op: &'static str) -> AppResult<MutexGuard<'_, Tables>> {
        *lock(&self.calls).entry(op).or_insert(0) += 1;
        if let Some(err) = lock(&self.failures).remove(op) {
            return Err(err);
        }
        Ok(lock(&self.tables))
    }

    /// Insert or replace a profile without counting a call.
    pub fn seed_profile(&self, profile: user::Model) {
        let mut tables = lock(&self.tables);
        tables.users.retain(|u| u.id != profile.id);
        tables.users.push(profile);
    }

    pub fn seed_edge(&self, edge: friendship::Model) {
        lock(&self.tables).edges.push(edge);
    }

    pub fn seed_post(&self, post: post::Model) {
        lock(&self.tables).posts.push(post);
    }

    pub fn seed_reaction(&self, reaction: reaction::Model) {
        lock(&self.tables).reactions.push(reaction);
    }

    pub fn seed_comment(&self, comment: comment::Model) {
        lock(&self.tables).comments.push(comment);
    }

    #[must_use]
    pub fn edges(&self) -> Vec<friendship::Model> {
        lock(&self.tables).edges.clone()
    }

    #[must_use]
    pub fn reactions(&self) -> Vec<reaction::Model> {
        lock(&self.tables).reactions.clone()
    }

    #[must_use]
    pub fn comments(&self) -> Vec<comment::Model> {
        lock(&self.tables).comments.clone()
    }

    #[must_use]
    pub fn posts(&self) -> Vec<post::Model> {
        lock(&self.tables).posts.clone()
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn find_profile(&self, id: &str) -> AppResult<Option<user::Model>> {
        let tables = self.enter("find_profile")?;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_profiles(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        let tables = self.enter("find_profiles")?;
        Ok(tables
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn insert_profile(&self, profile: user::Model) -> AppResult<user::Model> {
        let mut tables = self.enter("insert_profile")?;
        if tables
            .users
            .iter()
            .any(|u| u.id == profile.id || u.username == profile.username)
        {
            return Err(AppError::Conflict(format!(
                "duplicate key value violates unique constraint on \"{}\"",
                profile.username
            )));
        }
        tables.users.push(profile.clone());
        Ok(profile)
    }

    async fn update_profile(&self, profile: user::Model) -> AppResult<user::Model> {
        let mut tables = self.enter("update_profile")?;
        let slot = tables
            .users
            .iter_mut()
            .find(|u| u.id == profile.id)
            .ok_or_else(|| AppError::UserNotFound(profile.id.clone()))?;
        *slot = profile.clone();
        Ok(profile)
    }

    async fn search_profiles(
        &self,
        query: &str,
        exclude_id: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<user::Model>> {
        let tables = self.enter("search_profiles")?;
        let needle = query.to_lowercase();
        let mut found: Vec<user::Model> = tables
            .users
            .iter()
            .filter(|u| Some(u.id.as_str()) != exclude_id)
            .filter(|u| {
                u.username.contains(&needle) || u.display_name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.username.cmp(&b.username));
        found.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(found)
    }
}

#[async_trait]
impl FriendshipStore for InMemoryStore {
    async fn edges_for(&self, user_id: &str) -> AppResult<Vec<friendship::Model>> {
        let tables = self.enter("edges_for")?;
        let mut edges: Vec<friendship::Model> = tables
            .edges
            .iter()
            .filter(|e| e.touches(user_id))
            .cloned()
            .collect();
        edges.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(edges)
    }

    async fn insert_edge(&self, edge: friendship::Model) -> AppResult<friendship::Model> {
        let mut tables = self.enter("insert_edge")?;
        let live_duplicate = tables.edges.iter().any(|e| {
            e.status != FriendshipStatus::Declined
                && e.connects(&edge.requester_id, &edge.addressee_id)
        });
        if live_duplicate {
            return Err(AppError::Conflict(
                "duplicate key value violates unique constraint \"idx_friendship_live_pair\""
                    .to_string(),
            ));
        }
        tables.edges.push(edge.clone());
        Ok(edge)
    }

    async fn respond_to_edge(
        &self,
        edge_id: &str,
        addressee_id: &str,
        status: FriendshipStatus,
    ) -> AppResult<friendship::Model> {
        let mut tables = self.enter("respond_to_edge")?;
        let edge = tables
            .edges
            .iter_mut()
            .find(|e| e.id == edge_id)
            .ok_or_else(|| AppError::NotFound(format!("Friendship {edge_id}")))?;
        if edge.addressee_id != addressee_id {
            return Err(AppError::Forbidden(
                "Only the addressee can answer a friend request".to_string(),
            ));
        }
        if edge.status != FriendshipStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Friend request {edge_id} is no longer pending"
            )));
        }
        edge.status = status;
        Ok(edge.clone())
    }

    async fn delete_edge(&self, edge_id: &str, user_id: &str) -> AppResult<()> {
        let mut tables = self.enter("delete_edge")?;
        let edge = tables
            .edges
            .iter()
            .find(|e| e.id == edge_id)
            .ok_or_else(|| AppError::NotFound(format!("Friendship {edge_id}")))?;
        if !edge.touches(user_id) {
            return Err(AppError::Forbidden(
                "Only a party to the friendship can remove it".to_string(),
            ));
        }
        tables.edges.retain(|e| e.id != edge_id);
        Ok(())
    }

    async fn delete_declined_between(&self, user_id: &str, other_id: &str) -> AppResult<u64> {
        let mut tables = self.enter("delete_declined_between")?;
        let before = tables.edges.len();
        tables.edges.retain(|e| {
            !(e.status == FriendshipStatus::Declined && e.connects(user_id, other_id))
        });
        Ok((before - tables.edges.len()) as u64)
    }
}

#[async_trait]
impl PostStore for InMemoryStore {
    async fn posts_by_authors(
        &self,
        author_ids: &[String],
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<post::Model>> {
        let tables = self.enter("posts_by_authors")?;
        let mut posts: Vec<post::Model> = tables
            .posts
            .iter()
            .filter(|p| author_ids.contains(&p.user_id))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(posts
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn insert_post(&self, post: post::Model) -> AppResult<post::Model> {
        let mut tables = self.enter("insert_post")?;
        if !tables.users.iter().any(|u| u.id == post.user_id) {
            return Err(AppError::NotFound(format!("User {}", post.user_id)));
        }
        tables.posts.push(post.clone());
        Ok(post)
    }

    async fn delete_post(&self, id: &str, user_id: &str) -> AppResult<()> {
        let mut tables = self.enter("delete_post")?;
        let post = tables
            .posts
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::PostNotFound(id.to_string()))?;
        if post.user_id != user_id {
            return Err(AppError::Forbidden(
                "Only the author can delete a post".to_string(),
            ));
        }
        tables.posts.retain(|p| p.id != id);
        tables.reactions.retain(|r| r.post_id != id);
        tables.comments.retain(|c| c.post_id != id);
        Ok(())
    }
}

#[async_trait]
impl ReactionStore for InMemoryStore {
    async fn reactions_for_posts(&self, post_ids: &[String]) -> AppResult<Vec<reaction::Model>> {
        let tables = self.enter("reactions_for_posts")?;
        Ok(tables
            .reactions
            .iter()
            .filter(|r| post_ids.contains(&r.post_id))
            .cloned()
            .collect())
    }

    async fn insert_reaction(&self, reaction: reaction::Model) -> AppResult<reaction::Model> {
        let mut tables = self.enter("insert_reaction")?;
        if !tables.posts.iter().any(|p| p.id == reaction.post_id) {
            return Err(AppError::NotFound(format!("Post {}", reaction.post_id)));
        }
        if tables
            .reactions
            .iter()
            .any(|r| r.post_id == reaction.post_id && r.user_id == reaction.user_id)
        {
            return Err(AppError::Conflict(
                "duplicate key value violates unique constraint \"idx_reaction_post_user\""
                    .to_string(),
            ));
        }
        tables.reactions.push(reaction.clone());
        Ok(reaction)
    }

    async fn delete_reaction(&self, post_id: &str, user_id: &str) -> AppResult<u64> {
        let mut tables = self.enter("delete_reaction")?;
        let before = tables.reactions.len();
        tables
            .reactions
            .retain(|r| !(r.post_id == post_id && r.user_id == user_id));
        Ok((before - tables.reactions.len()) as u64)
    }
}

#[async_trait]
impl CommentStore for InMemoryStore {
    async fn comments_for_post(&self, post_id: &str) -> AppResult<Vec<comment::Model>> {
        let tables = self.enter("comments_for_post")?;
        let mut comments: Vec<comment::Model> = tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn comments_for_posts(&self, post_ids: &[String]) -> AppResult<Vec<comment::Model>> {
        let tables = self.enter("comments_for_posts")?;
        let mut comments: Vec<comment::Model> = tables
            .comments
            .iter()
            .filter(|c| post_ids.contains(&c.post_id))
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn insert_comment(&self, comment: comment::Model) -> AppResult<comment::Model> {
        let mut tables = self.enter("insert_comment")?;
        if !tables.posts.iter().any(|p| p.id == comment.post_id) {
            return Err(AppError::NotFound(format!("Post {}", comment.post_id)));
        }
        if let Some(parent_id) = &comment.parent_id {
            if !tables.comments.iter().any(|c| &c.id == parent_id) {
                return Err(AppError::NotFound(format!("Comment {parent_id}")));
            }
        }
        tables.comments.push(comment.clone());
        Ok(comment)
    }

    async fn delete_comment(&self, id: &str, user_id: &str) -> AppResult<()> {
        let mut tables = self.enter("delete_comment")?;
        let comment = tables
            .comments
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::CommentNotFound(id.to_string()))?;
        if comment.user_id != user_id {
            return Err(AppError::Forbidden(
                "Only the author can delete a comment".to_string(),
            ));
        }
        // Same as the recursive parent_id cascade
        let mut doomed: HashSet<String> = HashSet::from([id.to_string()]);
        loop {
            let before = doomed.len();
            for c in &tables.comments {
                if c.parent_id.as_ref().is_some_and(|p| doomed.contains(p)) {
                    doomed.insert(c.id.clone());
                }
            }
            if doomed.len() == before {
                break;
            }
        }
        tables.comments.retain(|c| !doomed.contains(&c.id));
        Ok(())
    }
}

//! Feed aggregation.
//!
//! A feed page is built from one query for posts by the viewer and their
//! accepted friends, followed by one bulk query each for reactions, comments
//! and author profiles over the page's ids. [`FeedState`] accumulates pages
//! for a screen and keeps locally deleted posts from coming back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use geofeed_common::{AppError, AppResult};
use geofeed_db::entities::{comment, post, user};
use serde::Serialize;

use crate::services::reaction::{ReactionService, ReactionState, fold_by_post};
use crate::services::sequence::{FetchSequence, Ticket};
use crate::services::store::{CommentStore, PostStore, ProfileStore, ReactionStore, Stores};

/// A post with everything a feed card shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedRow {
    pub post: post::Model,
    /// `None` if the author's profile could not be read.
    pub author: Option<user::Model>,
    pub reactions: ReactionState,
    pub comment_count: usize,
    pub latest_comment: Option<comment::Model>,
}

/// One page of feed rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedPage {
    pub rows: Vec<FeedRow>,
    /// Whether the page came back full.
    pub has_more: bool,
}

/// Feed service for business logic.
#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostStore>,
    reactions: Arc<dyn ReactionStore>,
    comments: Arc<dyn CommentStore>,
    profiles: Arc<dyn ProfileStore>,
}

impl FeedService {
    #[must_use]
    pub fn new(stores: &Stores) -> Self {
        Self {
            posts: Arc::clone(&stores.posts),
            reactions: Arc::clone(&stores.reactions),
            comments: Arc::clone(&stores.comments),
            profiles: Arc::clone(&stores.profiles),
        }
    }

    /// Load one page of posts visible to `viewer_id`.
    ///
    /// `friend_ids` are the viewer's accepted friends; an empty list still
    /// returns the viewer's own posts.
    pub async fn load_page(
        &self,
        viewer_id: &str,
        friend_ids: &[String],
        offset: u64,
        limit: u64,
    ) -> AppResult<FeedPage> {
        if limit == 0 {
            return Err(AppError::BadRequest("Page limit must be positive".to_string()));
        }

        let mut author_ids: Vec<String> = Vec::with_capacity(friend_ids.len() + 1);
        author_ids.push(viewer_id.to_string());
        author_ids.extend(friend_ids.iter().filter(|id| *id != viewer_id).cloned());
        author_ids.sort();
        author_ids.dedup();

        let posts = self
            .posts
            .posts_by_authors(&author_ids, offset, limit)
            .await?;
        let has_more = posts.len() as u64 == limit;

        if posts.is_empty() {
            tracing::debug!(viewer_id, offset, "Feed page is empty");
            return Ok(FeedPage::default());
        }

        let post_ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        let mut page_authors: Vec<String> = posts.iter().map(|p| p.user_id.clone()).collect();
        page_authors.sort();
        page_authors.dedup();

        let (reactions, comments, profiles) = futures::try_join!(
            self.reactions.reactions_for_posts(&post_ids),
            self.comments.comments_for_posts(&post_ids),
            self.profiles.find_profiles(&page_authors),
        )?;

        let mut reaction_states = fold_by_post(&reactions, viewer_id);
        let (mut comment_counts, mut latest_comments) = fold_comments(comments);
        let profiles: HashMap<String, user::Model> =
            profiles.into_iter().map(|p| (p.id.clone(), p)).collect();

        let rows = posts
            .into_iter()
            .map(|post| FeedRow {
                author: profiles.get(&post.user_id).cloned(),
                reactions: reaction_states.remove(&post.id).unwrap_or_default(),
                comment_count: comment_counts.remove(&post.id).unwrap_or(0),
                latest_comment: latest_comments.remove(&post.id),
                post,
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            viewer_id,
            offset,
            rows = rows.len(),
            has_more,
            "Loaded feed page"
        );
        Ok(FeedPage { rows, has_more })
    }
}

/// Comment totals and the most recent comment per post.
///
/// `comments` must be ordered newest first; the first one seen for a post is
/// its latest.
fn fold_comments(
    comments: Vec<comment::Model>,
) -> (HashMap<String, usize>, HashMap<String, comment::Model>) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut latest: HashMap<String, comment::Model> = HashMap::new();

    for comment in comments {
        *counts.entry(comment.post_id.clone()).or_insert(0) += 1;
        latest.entry(comment.post_id.clone()).or_insert(comment);
    }

    (counts, latest)
}

/// How a loaded page is merged into [`FeedState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Initial load or pull-to-refresh.
    Replace,
    /// Next page while scrolling.
    Append,
}

/// Accumulated feed rows for one screen.
#[derive(Debug, Clone)]
pub struct FeedState {
    viewer_id: String,
    page_size: u64,
    rows: Vec<FeedRow>,
    has_more: bool,
    next_offset: u64,
    removed: HashSet<String>,
    sequence: FetchSequence,
}

impl FeedState {
    #[must_use]
    pub fn new(viewer_id: impl Into<String>, page_size: u64) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            page_size,
            rows: Vec::new(),
            has_more: true,
            next_offset: 0,
            removed: HashSet::new(),
            sequence: FetchSequence::new(),
        }
    }

    #[must_use]
    pub fn rows(&self) -> &[FeedRow] {
        &self.rows
    }

    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub fn row(&self, post_id: &str) -> Option<&FeedRow> {
        self.rows.iter().find(|r| r.post.id == post_id)
    }

    /// Offset the next load in `mode` should request.
    #[must_use]
    pub const fn offset_for(&self, mode: LoadMode) -> u64 {
        match mode {
            LoadMode::Replace => 0,
            LoadMode::Append => self.next_offset,
        }
    }

    /// Start a load; only the latest ticket may apply its page.
    pub const fn begin_load(&mut self) -> Ticket {
        self.sequence.issue()
    }

    /// Ignore every load still in flight (screen unmounted).
    pub const fn detach(&mut self) {
        self.sequence.invalidate_all();
    }

    /// Merge the result of the load identified by `ticket`.
    ///
    /// Returns whether anything was applied. A failed read leaves the
    /// current rows in place.
    pub fn apply_page(&mut self, ticket: Ticket, mode: LoadMode, result: AppResult<FeedPage>) -> bool {
        if !self.sequence.is_current(ticket) {
            tracing::debug!(?ticket, "Discarding superseded feed page");
            return false;
        }

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(error = %err, mode = ?mode, "Failed to load feed, keeping cached rows");
                return false;
            }
        };

        let fetched = page.rows.len() as u64;
        let fresh = page
            .rows
            .into_iter()
            .filter(|row| !self.removed.contains(&row.post.id));

        match mode {
            LoadMode::Replace => {
                self.rows = fresh.collect();
                self.next_offset = fetched;
            }
            LoadMode::Append => {
                let mut seen: HashSet<String> =
                    self.rows.iter().map(|r| r.post.id.clone()).collect();
                let new_rows: Vec<FeedRow> =
                    fresh.filter(|row| seen.insert(row.post.id.clone())).collect();
                self.rows.extend(new_rows);
                self.next_offset += fetched;
            }
        }

        self.has_more = page.has_more;
        true
    }

    /// Fetch a page for `friend_ids` and merge it.
    pub async fn load(
        &mut self,
        service: &FeedService,
        friend_ids: &[String],
        mode: LoadMode,
    ) -> bool {
        let ticket = self.begin_load();
        let result = service
            .load_page(&self.viewer_id, friend_ids, self.offset_for(mode), self.page_size)
            .await;
        self.apply_page(ticket, mode, result)
    }

    /// Drop a deleted post and keep it from reappearing in later pages.
    pub fn remove_post(&mut self, post_id: &str) -> Option<FeedRow> {
        self.removed.insert(post_id.to_string());

        let index = self.rows.iter().position(|r| r.post.id == post_id)?;
        // Everything after it on the server shifted up by one
        self.next_offset = self.next_offset.saturating_sub(1);
        Some(self.rows.remove(index))
    }

    /// Record a comment just posted on a loaded post.
    ///
    /// Loads already in flight may predate the comment and are dropped.
    pub fn comment_added(&mut self, comment: &comment::Model) {
        self.sequence.invalidate_all();
        if let Some(row) = self.rows.iter_mut().find(|r| r.post.id == comment.post_id) {
            row.comment_count += 1;
            row.latest_comment = Some(comment.clone());
        }
    }

    /// Toggle the viewer's reaction on a loaded post.
    ///
    /// A post that turns out to be gone is removed from the feed. Loads
    /// already in flight may predate the toggle and are dropped.
    pub async fn toggle_reaction(
        &mut self,
        service: &ReactionService,
        post_id: &str,
        emoji: &str,
    ) -> AppResult<()> {
        let row = self
            .rows
            .iter_mut()
            .find(|r| r.post.id == post_id)
            .ok_or_else(|| AppError::PostNotFound(post_id.to_string()))?;
        self.sequence.invalidate_all();

        let result = service
            .toggle(post_id, &self.viewer_id, emoji, &mut row.reactions)
            .await;

        if result.as_ref().is_err_and(AppError::is_not_found) {
            tracing::info!(post_id, "Post disappeared while reacting, removing from feed");
            self.remove_post(post_id);
        }
        result
    }
}

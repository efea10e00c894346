//! Remote store abstraction.
//!
//! Core components reach the relational store only through these traits.
//! The database crate's repositories implement them for production use; an
//! in-memory implementation backs the tests. Every multi-row read takes the
//! full id list and is expected to be a single round trip.

use async_trait::async_trait;
use geofeed_common::AppResult;
use geofeed_db::entities::{
    comment,
    friendship::{self, FriendshipStatus},
    post, reaction, user,
};
use geofeed_db::repositories::{
    CommentRepository, FriendshipRepository, PostRepository, ReactionRepository, UserRepository,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, IntoActiveModel};
use std::sync::Arc;

/// Profile rows.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch a single profile.
    async fn find_profile(&self, id: &str) -> AppResult<Option<user::Model>>;

    /// Fetch every profile in `ids` in one call.
    async fn find_profiles(&self, ids: &[String]) -> AppResult<Vec<user::Model>>;

    /// Insert a profile. A taken username fails with `Conflict`.
    async fn insert_profile(&self, profile: user::Model) -> AppResult<user::Model>;

    /// Overwrite a profile.
    async fn update_profile(&self, profile: user::Model) -> AppResult<user::Model>;

    /// Case-insensitive substring search over username and display name.
    async fn search_profiles(
        &self,
        query: &str,
        exclude_id: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<user::Model>>;
}

/// Friendship edge rows.
#[async_trait]
pub trait FriendshipStore: Send + Sync {
    /// Every edge touching `user_id`, in either direction.
    async fn edges_for(&self, user_id: &str) -> AppResult<Vec<friendship::Model>>;

    /// Insert an edge. A live edge for the same pair fails with `Conflict`.
    async fn insert_edge(&self, edge: friendship::Model) -> AppResult<friendship::Model>;

    /// Answer a pending request as its addressee; anyone else gets `Forbidden`.
    async fn respond_to_edge(
        &self,
        edge_id: &str,
        addressee_id: &str,
        status: FriendshipStatus,
    ) -> AppResult<friendship::Model>;

    /// Delete an edge `user_id` is party to.
    async fn delete_edge(&self, edge_id: &str, user_id: &str) -> AppResult<()>;

    /// Delete declined edges between two users, returning how many were removed.
    async fn delete_declined_between(&self, user_id: &str, other_id: &str) -> AppResult<u64>;
}

/// Post rows.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Posts by any of `author_ids`, newest first, offset-paginated.
    async fn posts_by_authors(
        &self,
        author_ids: &[String],
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<post::Model>>;

    /// Insert a post.
    async fn insert_post(&self, post: post::Model) -> AppResult<post::Model>;

    /// Delete a post owned by `user_id`; reactions and comments cascade.
    async fn delete_post(&self, id: &str, user_id: &str) -> AppResult<()>;
}

/// Reaction rows.
#[async_trait]
pub trait ReactionStore: Send + Sync {
    /// Every reaction on any of `post_ids`.
    async fn reactions_for_posts(&self, post_ids: &[String]) -> AppResult<Vec<reaction::Model>>;

    /// Insert a reaction. A second row for the same (post, user) fails with `Conflict`.
    async fn insert_reaction(&self, reaction: reaction::Model) -> AppResult<reaction::Model>;

    /// Delete the (post, user) reaction row, returning how many were removed.
    async fn delete_reaction(&self, post_id: &str, user_id: &str) -> AppResult<u64>;
}

/// Comment rows.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Every comment on one post, oldest first.
    async fn comments_for_post(&self, post_id: &str) -> AppResult<Vec<comment::Model>>;

    /// Every comment on any of `post_ids`, newest first.
    async fn comments_for_posts(&self, post_ids: &[String]) -> AppResult<Vec<comment::Model>>;

    /// Insert a comment.
    async fn insert_comment(&self, comment: comment::Model) -> AppResult<comment::Model>;

    /// Delete a comment written by `user_id`; its replies cascade.
    async fn delete_comment(&self, id: &str, user_id: &str) -> AppResult<()>;
}

/// The full set of stores a session works against.
#[derive(Clone)]
pub struct Stores {
    pub profiles: Arc<dyn ProfileStore>,
    pub friendships: Arc<dyn FriendshipStore>,
    pub posts: Arc<dyn PostStore>,
    pub reactions: Arc<dyn ReactionStore>,
    pub comments: Arc<dyn CommentStore>,
}

impl Stores {
    /// Build stores backed by the database repositories.
    #[must_use]
    pub fn from_connection(db: &Arc<DatabaseConnection>) -> Self {
        Self {
            profiles: Arc::new(UserRepository::new(Arc::clone(db))),
            friendships: Arc::new(FriendshipRepository::new(Arc::clone(db))),
            posts: Arc::new(PostRepository::new(Arc::clone(db))),
            reactions: Arc::new(ReactionRepository::new(Arc::clone(db))),
            comments: Arc::new(CommentRepository::new(Arc::clone(db))),
        }
    }

    /// Build stores that all share one backing implementation.
    #[must_use]
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ProfileStore + FriendshipStore + PostStore + ReactionStore + CommentStore + 'static,
    {
        Self {
            profiles: store.clone(),
            friendships: store.clone(),
            posts: store.clone(),
            reactions: store.clone(),
            comments: store,
        }
    }
}

// ==================== Database-backed implementations ====================

#[async_trait]
impl ProfileStore for UserRepository {
    async fn find_profile(&self, id: &str) -> AppResult<Option<user::Model>> {
        self.find_by_id(id).await
    }

    async fn find_profiles(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        self.find_by_ids(ids).await
    }

    async fn insert_profile(&self, profile: user::Model) -> AppResult<user::Model> {
        self.create(profile.into_active_model().reset_all()).await
    }

    async fn update_profile(&self, profile: user::Model) -> AppResult<user::Model> {
        self.update(profile.into_active_model().reset_all()).await
    }

    async fn search_profiles(
        &self,
        query: &str,
        exclude_id: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<user::Model>> {
        self.search(query, exclude_id, limit).await
    }
}

#[async_trait]
impl FriendshipStore for FriendshipRepository {
    async fn edges_for(&self, user_id: &str) -> AppResult<Vec<friendship::Model>> {
        self.find_for_user(user_id).await
    }

    async fn insert_edge(&self, edge: friendship::Model) -> AppResult<friendship::Model> {
        self.create(edge.into_active_model().reset_all()).await
    }

    async fn respond_to_edge(
        &self,
        edge_id: &str,
        addressee_id: &str,
        status: FriendshipStatus,
    ) -> AppResult<friendship::Model> {
        self.respond(edge_id, addressee_id, status).await
    }

    async fn delete_edge(&self, edge_id: &str, user_id: &str) -> AppResult<()> {
        self.delete_as_party(edge_id, user_id).await
    }

    async fn delete_declined_between(&self, user_id: &str, other_id: &str) -> AppResult<u64> {
        Self::delete_declined_between(self, user_id, other_id).await
    }
}

#[async_trait]
impl PostStore for PostRepository {
    async fn posts_by_authors(
        &self,
        author_ids: &[String],
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<post::Model>> {
        self.find_by_authors(author_ids, offset, limit).await
    }

    async fn insert_post(&self, post: post::Model) -> AppResult<post::Model> {
        self.create(post.into_active_model().reset_all()).await
    }

    async fn delete_post(&self, id: &str, user_id: &str) -> AppResult<()> {
        self.delete_owned(id, user_id).await
    }
}

#[async_trait]
impl ReactionStore for ReactionRepository {
    async fn reactions_for_posts(&self, post_ids: &[String]) -> AppResult<Vec<reaction::Model>> {
        self.find_by_posts(post_ids).await
    }

    async fn insert_reaction(&self, reaction: reaction::Model) -> AppResult<reaction::Model> {
        self.create(reaction.into_active_model().reset_all()).await
    }

    async fn delete_reaction(&self, post_id: &str, user_id: &str) -> AppResult<u64> {
        self.delete_by_user_and_post(user_id, post_id).await
    }
}

#[async_trait]
impl CommentStore for CommentRepository {
    async fn comments_for_post(&self, post_id: &str) -> AppResult<Vec<comment::Model>> {
        self.find_by_post(post_id).await
    }

    async fn comments_for_posts(&self, post_ids: &[String]) -> AppResult<Vec<comment::Model>> {
        self.find_by_posts(post_ids).await
    }

    async fn insert_comment(&self, comment: comment::Model) -> AppResult<comment::Model> {
        self.create(comment.into_active_model().reset_all()).await
    }

    async fn delete_comment(&self, id: &str, user_id: &str) -> AppResult<()> {
        self.delete_owned(id, user_id).await
    }
}

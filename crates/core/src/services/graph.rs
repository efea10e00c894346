//! Social graph cache and friendship mutations.
//!
//! The cache holds the viewer's raw friendship edges together with the
//! profiles of every counter-party, and derives friend lists, pending
//! request lists and counts from them. It has no expiry: it is refetched
//! when a friendship mutation succeeds, when the owning screen regains
//! focus, or on an explicit refresh.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use geofeed_common::{AppError, AppResult, IdGenerator};
use geofeed_db::entities::{
    friendship::{self, FriendshipStatus},
    user,
};
use serde::Serialize;

use crate::services::optimistic;
use crate::services::relationship::{RelationshipState, deciding_edge, resolve};
use crate::services::sequence::{FetchSequence, Ticket};
use crate::services::store::{FriendshipStore, ProfileStore, Stores};

/// An accepted friend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Friend {
    pub edge_id: String,
    pub user_id: String,
    /// `None` when the profile was not returned with the edges.
    pub profile: Option<user::Model>,
}

/// A pending request together with the other user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRequest {
    pub edge: friendship::Model,
    /// `None` when the profile was not returned with the edges.
    pub counterparty: Option<user::Model>,
}

/// A snapshot of the viewer's friendship edges and counter-party profiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocialGraph {
    viewer_id: String,
    edges: Vec<friendship::Model>,
    profiles: HashMap<String, user::Model>,
}

impl SocialGraph {
    /// An empty graph for `viewer_id`.
    #[must_use]
    pub fn empty(viewer_id: impl Into<String>) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            ..Self::default()
        }
    }

    /// Build a graph from raw rows.
    #[must_use]
    pub fn new(
        viewer_id: impl Into<String>,
        edges: Vec<friendship::Model>,
        profiles: Vec<user::Model>,
    ) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            edges,
            profiles: profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    #[must_use]
    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    #[must_use]
    pub fn edges(&self) -> &[friendship::Model] {
        &self.edges
    }

    #[must_use]
    pub fn profile(&self, user_id: &str) -> Option<&user::Model> {
        self.profiles.get(user_id)
    }

    /// How the viewer relates to `other_id`.
    #[must_use]
    pub fn relationship_to(&self, other_id: &str) -> RelationshipState {
        resolve(&self.viewer_id, other_id, &self.edges)
    }

    /// The edge that decides the relationship to `other_id`, if any.
    #[must_use]
    pub fn edge_with(&self, other_id: &str) -> Option<&friendship::Model> {
        deciding_edge(&self.viewer_id, other_id, &self.edges)
    }

    /// Every user the viewer has an edge with, in id order.
    fn counterparties(&self) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter(|e| e.touches(&self.viewer_id))
            .map(|e| e.other_party(&self.viewer_id))
            .filter(|other| *other != self.viewer_id)
            .collect()
    }

    fn in_state(&self, state: RelationshipState) -> Vec<(&str, &friendship::Model)> {
        self.counterparties()
            .into_iter()
            .filter(|other| self.relationship_to(other) == state)
            .filter_map(|other| self.edge_with(other).map(|edge| (other, edge)))
            .collect()
    }

    /// Ids of accepted friends, sorted.
    #[must_use]
    pub fn friend_ids(&self) -> Vec<String> {
        self.in_state(RelationshipState::Friends)
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect()
    }

    /// Accepted friends with their profiles, ordered by username.
    ///
    /// Friends without a cached profile sort by id after the named ones.
    #[must_use]
    pub fn friends(&self) -> Vec<Friend> {
        let mut friends: Vec<Friend> = self
            .in_state(RelationshipState::Friends)
            .into_iter()
            .map(|(id, edge)| Friend {
                edge_id: edge.id.clone(),
                user_id: id.to_string(),
                profile: self.profiles.get(id).cloned(),
            })
            .collect();
        friends.sort_by(|a, b| {
            let key = |f: &Friend| {
                (
                    f.profile.is_none(),
                    f.profile.as_ref().map(|p| p.username.clone()),
                    f.user_id.clone(),
                )
            };
            key(a).cmp(&key(b))
        });
        friends
    }

    #[must_use]
    pub fn friend_count(&self) -> usize {
        self.in_state(RelationshipState::Friends).len()
    }

    fn requests(&self, state: RelationshipState) -> Vec<PendingRequest> {
        let mut requests: Vec<PendingRequest> = self
            .in_state(state)
            .into_iter()
            .map(|(id, edge)| PendingRequest {
                edge: edge.clone(),
                counterparty: self.profiles.get(id).cloned(),
            })
            .collect();
        requests.sort_by(|a, b| b.edge.created_at.cmp(&a.edge.created_at));
        requests
    }

    /// Requests other users sent to the viewer, newest first.
    #[must_use]
    pub fn incoming_requests(&self) -> Vec<PendingRequest> {
        self.requests(RelationshipState::PendingReceived)
    }

    /// Requests the viewer sent that are still pending, newest first.
    #[must_use]
    pub fn outgoing_requests(&self) -> Vec<PendingRequest> {
        self.requests(RelationshipState::PendingSent)
    }

    /// Number of requests waiting for the viewer to answer.
    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.in_state(RelationshipState::PendingReceived).len()
    }

    fn upsert_edge(&mut self, edge: friendship::Model) {
        match self.edges.iter_mut().find(|e| e.id == edge.id) {
            Some(slot) => *slot = edge,
            None => self.edges.push(edge),
        }
    }

    fn set_status(&mut self, edge_id: &str, status: FriendshipStatus) {
        if let Some(edge) = self.edges.iter_mut().find(|e| e.id == edge_id) {
            edge.status = status;
        }
    }

    fn remove_edge(&mut self, edge_id: &str) {
        self.edges.retain(|e| e.id != edge_id);
    }

    fn remove_declined_with(&mut self, other_id: &str) {
        let viewer_id = self.viewer_id.clone();
        self.edges
            .retain(|e| !(e.status == FriendshipStatus::Declined && e.connects(&viewer_id, other_id)));
    }
}

/// Per-session cache of the viewer's [`SocialGraph`].
#[derive(Debug, Clone)]
pub struct SocialGraphCache {
    graph: SocialGraph,
    fresh: bool,
    sequence: FetchSequence,
}

impl SocialGraphCache {
    /// A cache for `viewer_id` that has not been loaded yet.
    #[must_use]
    pub fn new(viewer_id: impl Into<String>) -> Self {
        Self {
            graph: SocialGraph::empty(viewer_id),
            fresh: false,
            sequence: FetchSequence::new(),
        }
    }

    #[must_use]
    pub const fn graph(&self) -> &SocialGraph {
        &self.graph
    }

    /// Whether the cached graph reflects every mutation made through it.
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Mark the cache stale; the next [`ensure_fresh`](Self::ensure_fresh) refetches.
    pub fn invalidate(&mut self) {
        self.fresh = false;
    }

    /// A local mutation is starting; fetches issued before it may carry the
    /// pre-mutation graph and must not be applied.
    const fn supersede_fetches(&mut self) {
        self.sequence.invalidate_all();
    }

    /// Drop everything and ignore any fetch still in flight (sign-out).
    pub fn clear(&mut self) {
        let viewer_id = self.graph.viewer_id.clone();
        self.graph = SocialGraph::empty(viewer_id);
        self.fresh = false;
        self.sequence.invalidate_all();
    }

    /// Start a fetch. Only the most recently issued ticket may apply its result.
    pub const fn begin_refresh(&mut self) -> Ticket {
        self.sequence.issue()
    }

    /// Load the viewer's edges and every counter-party profile.
    ///
    /// Always two round trips regardless of how many edges exist.
    pub async fn fetch(stores: &Stores, viewer_id: &str) -> AppResult<SocialGraph> {
        let edges = stores.friendships.edges_for(viewer_id).await?;

        let mut other_ids: Vec<String> = edges
            .iter()
            .map(|e| e.other_party(viewer_id).to_string())
            .collect();
        other_ids.sort();
        other_ids.dedup();

        let profiles = if other_ids.is_empty() {
            Vec::new()
        } else {
            stores.profiles.find_profiles(&other_ids).await?
        };

        tracing::debug!(
            viewer_id,
            edges = edges.len(),
            profiles = profiles.len(),
            "Fetched social graph"
        );
        Ok(SocialGraph::new(viewer_id, edges, profiles))
    }

    /// Apply the result of the fetch identified by `ticket`.
    ///
    /// Returns whether the result was applied. Superseded results are
    /// dropped, and a failed read keeps the stale graph.
    pub fn apply(&mut self, ticket: Ticket, result: AppResult<SocialGraph>) -> bool {
        if !self.sequence.is_current(ticket) {
            tracing::debug!(?ticket, "Discarding superseded social graph fetch");
            return false;
        }

        match result {
            Ok(graph) => {
                self.graph = graph;
                self.fresh = true;
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to refresh social graph, keeping cached data");
                false
            }
        }
    }

    /// Refetch unconditionally (pull-to-refresh).
    pub async fn refresh(&mut self, stores: &Stores) -> bool {
        let ticket = self.begin_refresh();
        let result = Self::fetch(stores, &self.graph.viewer_id).await;
        self.apply(ticket, result)
    }

    /// Refetch only if the cache is stale.
    pub async fn ensure_fresh(&mut self, stores: &Stores) -> &SocialGraph {
        if !self.fresh {
            self.refresh(stores).await;
        }
        &self.graph
    }

    /// The owning screen regained focus.
    pub async fn on_focus(&mut self, stores: &Stores) -> &SocialGraph {
        self.invalidate();
        self.ensure_fresh(stores).await
    }
}

/// Friendship mutations: request, accept, decline, remove.
///
/// Each mutation updates the cache optimistically, rolls it back if the
/// store rejects the call, and invalidates the cache once it succeeds.
#[derive(Clone)]
pub struct FriendshipService {
    friendships: Arc<dyn FriendshipStore>,
    profiles: Arc<dyn ProfileStore>,
    id_gen: IdGenerator,
}

impl FriendshipService {
    #[must_use]
    pub fn new(stores: &Stores) -> Self {
        Self {
            friendships: Arc::clone(&stores.friendships),
            profiles: Arc::clone(&stores.profiles),
            id_gen: IdGenerator::new(),
        }
    }

    /// Send a friend request from the cache's viewer to `addressee_id`.
    pub async fn send_request(
        &self,
        cache: &mut SocialGraphCache,
        addressee_id: &str,
    ) -> AppResult<friendship::Model> {
        let viewer_id = cache.graph.viewer_id.clone();

        if viewer_id == addressee_id {
            return Err(AppError::BadRequest(
                "Cannot send a friend request to yourself".to_string(),
            ));
        }

        match cache.graph.relationship_to(addressee_id) {
            RelationshipState::None => {}
            RelationshipState::Friends => {
                return Err(AppError::Conflict("Already friends".to_string()));
            }
            RelationshipState::PendingSent => {
                return Err(AppError::Conflict(
                    "Friend request already sent".to_string(),
                ));
            }
            RelationshipState::PendingReceived => {
                return Err(AppError::Conflict(
                    "This user has already sent you a friend request".to_string(),
                ));
            }
        }

        if self.profiles.find_profile(addressee_id).await?.is_none() {
            return Err(AppError::UserNotFound(addressee_id.to_string()));
        }

        let edge = friendship::Model {
            id: self.id_gen.generate(),
            requester_id: viewer_id,
            addressee_id: addressee_id.to_string(),
            status: FriendshipStatus::Pending,
            created_at: Utc::now().into(),
        };

        cache.supersede_fetches();
        let local = edge.clone();
        let saved = optimistic::apply(
            &mut cache.graph,
            |g| {
                g.remove_declined_with(addressee_id);
                g.upsert_edge(local);
            },
            self.friendships.insert_edge(edge),
        )
        .await?;

        // Declined rows never block the live-pair index, so they are
        // cleared only once the new request exists
        if let Err(err) = self
            .friendships
            .delete_declined_between(&saved.requester_id, addressee_id)
            .await
        {
            tracing::warn!(error = %err, addressee_id, "Failed to clear declined friend requests");
        }

        tracing::debug!(edge_id = %saved.id, addressee_id, "Sent friend request");
        cache.graph.upsert_edge(saved.clone());
        cache.invalidate();
        Ok(saved)
    }

    /// Accept a request addressed to the viewer.
    pub async fn accept(
        &self,
        cache: &mut SocialGraphCache,
        edge_id: &str,
    ) -> AppResult<friendship::Model> {
        self.respond(cache, edge_id, FriendshipStatus::Accepted).await
    }

    /// Decline a request addressed to the viewer.
    pub async fn decline(
        &self,
        cache: &mut SocialGraphCache,
        edge_id: &str,
    ) -> AppResult<friendship::Model> {
        self.respond(cache, edge_id, FriendshipStatus::Declined).await
    }

    async fn respond(
        &self,
        cache: &mut SocialGraphCache,
        edge_id: &str,
        status: FriendshipStatus,
    ) -> AppResult<friendship::Model> {
        let viewer_id = cache.graph.viewer_id.clone();

        cache.supersede_fetches();
        let saved = optimistic::apply(
            &mut cache.graph,
            |g| g.set_status(edge_id, status),
            self.friendships.respond_to_edge(edge_id, &viewer_id, status),
        )
        .await?;

        tracing::debug!(edge_id, status = ?status, "Answered friend request");
        cache.graph.upsert_edge(saved.clone());
        cache.invalidate();
        Ok(saved)
    }

    /// Delete an edge the viewer is party to (unfriend or cancel a request).
    pub async fn remove(&self, cache: &mut SocialGraphCache, edge_id: &str) -> AppResult<()> {
        let viewer_id = cache.graph.viewer_id.clone();

        cache.supersede_fetches();
        optimistic::apply(
            &mut cache.graph,
            |g| g.remove_edge(edge_id),
            self.friendships.delete_edge(edge_id, &viewer_id),
        )
        .await?;

        tracing::debug!(edge_id, "Removed friendship edge");
        cache.invalidate();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryStore, edge_at, profile};

    fn setup() -> (Arc<InMemoryStore>, Stores) {
        let store = Arc::new(InMemoryStore::new());
        store.seed_profile(profile("alice", "alice"));
        store.seed_profile(profile("bob", "bob"));
        store.seed_profile(profile("carol", "carol"));
        let stores = Stores::shared(Arc::clone(&store));
        (store, stores)
    }

    #[test]
    fn test_graph_lists_and_counts() {
        let graph = SocialGraph::new(
            "alice",
            vec![
                edge_at("f1", "alice", "bob", FriendshipStatus::Accepted, 0),
                edge_at("f2", "carol", "alice", FriendshipStatus::Pending, 1),
                edge_at("f3", "alice", "dave", FriendshipStatus::Pending, 2),
                edge_at("f4", "erin", "alice", FriendshipStatus::Declined, 3),
            ],
            vec![profile("bob", "bob"), profile("carol", "carol")],
        );

        assert_eq!(graph.friend_ids(), vec!["bob".to_string()]);
        assert_eq!(graph.friend_count(), 1);
        assert_eq!(graph.friends()[0].profile.as_ref().unwrap().username, "bob");
        assert_eq!(graph.pending_request_count(), 1);

        let incoming = graph.incoming_requests();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].edge.id, "f2");
        assert_eq!(incoming[0].counterparty.as_ref().unwrap().username, "carol");

        let outgoing = graph.outgoing_requests();
        assert_eq!(outgoing.len(), 1);
        assert!(outgoing[0].counterparty.is_none());

        assert_eq!(graph.relationship_to("erin"), RelationshipState::None);
    }

    #[tokio::test]
    async fn test_fetch_is_two_round_trips() {
        let (store, stores) = setup();
        store.seed_edge(edge_at("f1", "alice", "bob", FriendshipStatus::Accepted, 0));
        store.seed_edge(edge_at("f2", "carol", "alice", FriendshipStatus::Accepted, 1));

        let mut cache = SocialGraphCache::new("alice");
        let graph = cache.ensure_fresh(&stores).await;

        assert_eq!(graph.friend_count(), 2);
        assert_eq!(store.calls("edges_for"), 1);
        assert_eq!(store.calls("find_profiles"), 1);
        assert!(cache.is_fresh());
    }

    #[tokio::test]
    async fn test_friend_request_lifecycle() {
        let (_store, stores) = setup();
        let service = FriendshipService::new(&stores);
        let mut alice = SocialGraphCache::new("alice");
        let mut bob = SocialGraphCache::new("bob");

        let edge = service.send_request(&mut alice, "bob").await.unwrap();
        assert_eq!(edge.status, FriendshipStatus::Pending);
        assert_eq!(
            alice.graph().relationship_to("bob"),
            RelationshipState::PendingSent
        );
        assert!(!alice.is_fresh());

        bob.refresh(&stores).await;
        assert_eq!(
            bob.graph().relationship_to("alice"),
            RelationshipState::PendingReceived
        );
        assert_eq!(bob.graph().pending_request_count(), 1);

        service.accept(&mut bob, &edge.id).await.unwrap();
        assert_eq!(bob.graph().relationship_to("alice"), RelationshipState::Friends);

        alice.ensure_fresh(&stores).await;
        assert_eq!(alice.graph().relationship_to("bob"), RelationshipState::Friends);
        assert_eq!(alice.graph().friends()[0].user_id, "bob");
    }

    #[tokio::test]
    async fn test_requester_cannot_accept_and_is_rolled_back() {
        let (_store, stores) = setup();
        let service = FriendshipService::new(&stores);
        let mut alice = SocialGraphCache::new("alice");

        let edge = service.send_request(&mut alice, "bob").await.unwrap();
        let result = service.accept(&mut alice, &edge.id).await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(
            alice.graph().relationship_to("bob"),
            RelationshipState::PendingSent
        );
    }

    #[tokio::test]
    async fn test_failed_request_is_rolled_back() {
        let (store, stores) = setup();
        let service = FriendshipService::new(&stores);
        let mut alice = SocialGraphCache::new("alice");
        alice.refresh(&stores).await;

        store.fail_next("insert_edge", AppError::NetworkFailure("offline".to_string()));
        let result = service.send_request(&mut alice, "bob").await;

        assert!(matches!(result, Err(AppError::NetworkFailure(_))));
        assert!(alice.graph().edges().is_empty());
        assert!(alice.is_fresh());
    }

    #[tokio::test]
    async fn test_duplicate_request_is_conflict() {
        let (store, stores) = setup();
        store.seed_edge(edge_at("f1", "bob", "alice", FriendshipStatus::Pending, 0));
        let service = FriendshipService::new(&stores);
        let mut alice = SocialGraphCache::new("alice");

        // Stale cache: the store's pair guard still rejects it
        let result = service.send_request(&mut alice, "bob").await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(alice.graph().edges().is_empty());

        alice.refresh(&stores).await;
        let result = service.send_request(&mut alice, "bob").await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_request_after_decline_replaces_declined_edge() {
        let (store, stores) = setup();
        store.seed_edge(edge_at("f1", "alice", "bob", FriendshipStatus::Declined, 0));
        let service = FriendshipService::new(&stores);
        let mut alice = SocialGraphCache::new("alice");
        alice.refresh(&stores).await;

        let edge = service.send_request(&mut alice, "bob").await.unwrap();

        let edges = store.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id, edge.id);
        assert_eq!(alice.graph().edges().len(), 1);
    }

    #[tokio::test]
    async fn test_self_and_unknown_requests() {
        let (_store, stores) = setup();
        let service = FriendshipService::new(&stores);
        let mut alice = SocialGraphCache::new("alice");

        assert!(matches!(
            service.send_request(&mut alice, "alice").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            service.send_request(&mut alice, "nobody").await,
            Err(AppError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_decline_and_remove() {
        let (store, stores) = setup();
        store.seed_edge(edge_at("f1", "carol", "alice", FriendshipStatus::Pending, 0));
        store.seed_edge(edge_at("f2", "alice", "bob", FriendshipStatus::Accepted, 1));
        let service = FriendshipService::new(&stores);
        let mut alice = SocialGraphCache::new("alice");
        alice.refresh(&stores).await;

        service.decline(&mut alice, "f1").await.unwrap();
        assert_eq!(alice.graph().relationship_to("carol"), RelationshipState::None);
        assert_eq!(alice.graph().pending_request_count(), 0);

        service.remove(&mut alice, "f2").await.unwrap();
        assert_eq!(alice.graph().friend_count(), 0);
        assert_eq!(store.edges().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_remove_restores_friend() {
        let (store, stores) = setup();
        store.seed_edge(edge_at("f1", "alice", "bob", FriendshipStatus::Accepted, 0));
        let service = FriendshipService::new(&stores);
        let mut alice = SocialGraphCache::new("alice");
        alice.refresh(&stores).await;

        store.fail_next("delete_edge", AppError::NetworkFailure("timeout".to_string()));
        assert!(service.remove(&mut alice, "f1").await.is_err());
        assert_eq!(alice.graph().friend_count(), 1);
    }

    #[tokio::test]
    async fn test_superseded_fetch_is_discarded() {
        let (store, stores) = setup();
        let mut cache = SocialGraphCache::new("alice");

        let first = cache.begin_refresh();
        let first_result = SocialGraphCache::fetch(&stores, "alice").await;

        store.seed_edge(edge_at("f1", "alice", "bob", FriendshipStatus::Accepted, 0));
        let second = cache.begin_refresh();
        let second_result = SocialGraphCache::fetch(&stores, "alice").await;

        // Newer result lands first, the older one must not overwrite it
        assert!(cache.apply(second, second_result));
        assert!(!cache.apply(first, first_result));
        assert_eq!(cache.graph().friend_count(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_keeps_stale_graph() {
        let (store, stores) = setup();
        store.seed_edge(edge_at("f1", "alice", "bob", FriendshipStatus::Accepted, 0));
        let mut cache = SocialGraphCache::new("alice");
        assert!(cache.refresh(&stores).await);

        store.fail_next("edges_for", AppError::NetworkFailure("offline".to_string()));
        let graph = cache.on_focus(&stores).await;

        assert_eq!(graph.friend_count(), 1);
        assert!(!cache.is_fresh());
    }

    #[tokio::test]
    async fn test_clear_drops_in_flight_fetch() {
        let (store, stores) = setup();
        store.seed_edge(edge_at("f1", "alice", "bob", FriendshipStatus::Accepted, 0));
        let mut cache = SocialGraphCache::new("alice");

        let ticket = cache.begin_refresh();
        let result = SocialGraphCache::fetch(&stores, "alice").await;
        cache.clear();

        assert!(!cache.apply(ticket, result));
        assert_eq!(cache.graph().friend_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_started_before_request_is_discarded() {
        let (store, stores) = setup();
        let service = FriendshipService::new(&stores);
        let mut alice = SocialGraphCache::new("alice");

        let ticket = alice.begin_refresh();
        let before_request = SocialGraphCache::fetch(&stores, "alice").await;
        service.send_request(&mut alice, "bob").await.unwrap();

        assert!(!alice.apply(ticket, before_request));
        assert_eq!(
            alice.graph().relationship_to("bob"),
            RelationshipState::PendingSent
        );
        assert!(!alice.is_fresh());

        alice.ensure_fresh(&stores).await;
        assert_eq!(store.edges().len(), 1);
        assert_eq!(
            alice.graph().relationship_to("bob"),
            RelationshipState::PendingSent
        );
    }

    #[tokio::test]
    async fn test_refresh_started_before_accept_is_discarded() {
        let (store, stores) = setup();
        store.seed_edge(edge_at("f1", "bob", "alice", FriendshipStatus::Pending, 0));
        let service = FriendshipService::new(&stores);
        let mut alice = SocialGraphCache::new("alice");
        alice.refresh(&stores).await;

        let ticket = alice.begin_refresh();
        let before_accept = SocialGraphCache::fetch(&stores, "alice").await;
        service.accept(&mut alice, "f1").await.unwrap();

        assert!(!alice.apply(ticket, before_accept));
        assert_eq!(alice.graph().relationship_to("bob"), RelationshipState::Friends);
    }

    #[tokio::test]
    async fn test_failed_request_keeps_declined_edge() {
        let (store, stores) = setup();
        store.seed_edge(edge_at("f1", "bob", "alice", FriendshipStatus::Declined, 0));
        let service = FriendshipService::new(&stores);
        let mut alice = SocialGraphCache::new("alice");
        alice.refresh(&stores).await;

        store.fail_next("insert_edge", AppError::NetworkFailure("offline".to_string()));
        assert!(service.send_request(&mut alice, "bob").await.is_err());

        assert_eq!(store.edges().len(), 1);
        assert_eq!(store.calls("delete_declined_between"), 0);
        assert_eq!(alice.graph().edges().len(), 1);
        assert_eq!(alice.graph().edges()[0].status, FriendshipStatus::Declined);
    }

    #[test]
    fn test_friend_without_profile_is_listed_and_counted() {
        let graph = SocialGraph::new(
            "alice",
            vec![
                edge_at("f1", "alice", "bob", FriendshipStatus::Accepted, 0),
                edge_at("f2", "alice", "zed", FriendshipStatus::Accepted, 1),
            ],
            vec![profile("zed", "zed")],
        );

        let friends = graph.friends();
        assert_eq!(friends.len(), graph.friend_count());
        assert_eq!(friends[0].user_id, "zed");
        assert_eq!(friends[1].user_id, "bob");
        assert!(friends[1].profile.is_none());
    }
}

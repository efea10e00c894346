//! Relationship resolution.
//!
//! Derives how a viewer relates to another user from the raw friendship
//! edges. Declined edges are ignored, so a declined request reads as no
//! relationship and may be sent again. If several live edges exist for one
//! pair, an accepted edge wins, otherwise the newest pending edge decides.

use geofeed_db::entities::friendship::{self, FriendshipStatus};
use serde::Serialize;

/// How the viewer relates to another user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipState {
    /// No live edge between the two users.
    None,
    /// The viewer sent a request that is still pending.
    PendingSent,
    /// The other user sent a request that is still pending.
    PendingReceived,
    /// An accepted edge connects the two users.
    Friends,
}

/// Find the edge that decides the relationship between `viewer_id` and `other_id`.
#[must_use]
pub fn deciding_edge<'a>(
    viewer_id: &str,
    other_id: &str,
    edges: &'a [friendship::Model],
) -> Option<&'a friendship::Model> {
    let live = edges
        .iter()
        .filter(|e| e.status != FriendshipStatus::Declined && e.connects(viewer_id, other_id));

    live.max_by(|a, b| {
        let rank = |e: &friendship::Model| u8::from(e.status == FriendshipStatus::Accepted);
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    })
}

/// Classify the relationship between `viewer_id` and `other_id`.
#[must_use]
pub fn resolve(viewer_id: &str, other_id: &str, edges: &[friendship::Model]) -> RelationshipState {
    if viewer_id == other_id {
        return RelationshipState::None;
    }

    match deciding_edge(viewer_id, other_id, edges) {
        None => RelationshipState::None,
        Some(edge) => match edge.status {
            FriendshipStatus::Accepted => RelationshipState::Friends,
            FriendshipStatus::Pending if edge.requester_id == viewer_id => {
                RelationshipState::PendingSent
            }
            FriendshipStatus::Pending => RelationshipState::PendingReceived,
            FriendshipStatus::Declined => RelationshipState::None,
        },
    }
}

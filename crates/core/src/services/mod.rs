//! Business logic services.

#![allow(missing_docs)]

pub mod card_stack;
pub mod comment;
pub mod feed;
pub mod graph;
pub mod optimistic;
pub mod post;
pub mod profile;
pub mod reaction;
pub mod relationship;
pub mod sequence;
pub mod session;
pub mod store;

pub use card_stack::{CardStack, StackCard, SwipeOutcome};
pub use comment::{CommentService, CreateCommentInput, EntryKind, ThreadEntry, layout};
pub use feed::{FeedPage, FeedRow, FeedService, FeedState, LoadMode};
pub use graph::{Friend, FriendshipService, PendingRequest, SocialGraph, SocialGraphCache};
pub use post::{CreatePostInput, HeatmapCell, PostService};
pub use profile::{CompleteSignupInput, ProfileService, UpdateProfileInput, UserSearchResult};
pub use reaction::{REACTION_EMOJIS, ReactionCounts, ReactionService, ReactionState};
pub use relationship::{RelationshipState, deciding_edge, resolve};
pub use sequence::{FetchSequence, Ticket};
pub use session::Session;
pub use store::{CommentStore, FriendshipStore, PostStore, ProfileStore, ReactionStore, Stores};

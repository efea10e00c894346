//! Database entities.

#![allow(missing_docs)]

pub mod comment;
pub mod friendship;
pub mod post;
pub mod reaction;
pub mod user;

pub use comment::Entity as Comment;
pub use friendship::Entity as Friendship;
pub use post::Entity as Post;
pub use reaction::Entity as Reaction;
pub use user::Entity as User;

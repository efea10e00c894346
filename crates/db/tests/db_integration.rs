//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `geofeed_test`)
//!   `TEST_DB_PASSWORD` (default: `geofeed_test`)
//!   `TEST_DB_NAME` (default: `geofeed_test`)

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Utc;
use geofeed_common::AppError;
use geofeed_db::entities::{friendship, friendship::FriendshipStatus, post, reaction, user};
use geofeed_db::migrations::Migrator;
use geofeed_db::repositories::{
    FriendshipRepository, PostRepository, ReactionRepository, UserRepository,
};
use geofeed_db::test_utils::{TestDatabase, TestDbConfig};
use sea_orm::Set;
use sea_orm_migration::MigratorTrait;

async fn seed_user(repo: &UserRepository, id: &str, username: &str) -> user::Model {
    repo.create(user::ActiveModel {
        id: Set(id.to_string()),
        username: Set(username.to_string()),
        display_name: Set(username.to_string()),
        avatar_url: Set(None),
        created_at: Set(Utc::now().into()),
    })
    .await
    .unwrap()
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_database_connection() {
    let config = TestDbConfig::default();
    let result = TestDatabase::with_config(config).await;
    assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_duplicate_username_is_conflict() {
    let db = TestDatabase::create_unique().await.unwrap();
    let conn = Arc::new(
        sea_orm::Database::connect(&db.config.database_url())
            .await
            .unwrap(),
    );
    let users = UserRepository::new(Arc::clone(&conn));

    seed_user(&users, "u1", "alice").await;
    let result = users
        .create(user::ActiveModel {
            id: Set("u2".to_string()),
            username: Set("alice".to_string()),
            display_name: Set("Another Alice".to_string()),
            avatar_url: Set(None),
            created_at: Set(Utc::now().into()),
        })
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_friend_request_lifecycle() {
    let db = TestDatabase::create_unique().await.unwrap();
    let conn = Arc::new(
        sea_orm::Database::connect(&db.config.database_url())
            .await
            .unwrap(),
    );
    let users = UserRepository::new(Arc::clone(&conn));
    let friendships = FriendshipRepository::new(Arc::clone(&conn));

    seed_user(&users, "u1", "alice").await;
    seed_user(&users, "u2", "bob").await;

    let edge = friendships
        .create(friendship::ActiveModel {
            id: Set("f1".to_string()),
            requester_id: Set("u1".to_string()),
            addressee_id: Set("u2".to_string()),
            status: Set(FriendshipStatus::Pending),
            created_at: Set(Utc::now().into()),
        })
        .await
        .unwrap();
    assert_eq!(edge.status, FriendshipStatus::Pending);

    // A second live edge for the same pair, in either direction, is rejected
    let duplicate = friendships
        .create(friendship::ActiveModel {
            id: Set("f2".to_string()),
            requester_id: Set("u2".to_string()),
            addressee_id: Set("u1".to_string()),
            status: Set(FriendshipStatus::Pending),
            created_at: Set(Utc::now().into()),
        })
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    // The requester cannot accept their own request
    let forbidden = friendships
        .respond("f1", "u1", FriendshipStatus::Accepted)
        .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

    let accepted = friendships
        .respond("f1", "u2", FriendshipStatus::Accepted)
        .await
        .unwrap();
    assert_eq!(accepted.status, FriendshipStatus::Accepted);

    friendships.delete_as_party("f1", "u1").await.unwrap();
    assert!(friendships.find_for_user("u2").await.unwrap().is_empty());

    db.drop_database().await.unwrap();
}

fn edge(
    id: &str,
    from: &str,
    to: &str,
    status: FriendshipStatus,
    minutes: i64,
) -> friendship::ActiveModel {
    friendship::ActiveModel {
        id: Set(id.to_string()),
        requester_id: Set(from.to_string()),
        addressee_id: Set(to.to_string()),
        status: Set(status),
        created_at: Set((Utc::now() + chrono::Duration::minutes(minutes)).into()),
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_pair_index_migration_collapses_duplicates() {
    let db = TestDatabase::create_unique().await.unwrap();
    let conn = Arc::new(
        sea_orm::Database::connect(&db.config.database_url())
            .await
            .unwrap(),
    );
    let users = UserRepository::new(Arc::clone(&conn));
    let friendships = FriendshipRepository::new(Arc::clone(&conn));

    for (id, name) in [("u1", "alice"), ("u2", "bob"), ("u3", "carol")] {
        seed_user(&users, id, name).await;
    }

    // Roll back to before the pair index so duplicates can be written
    Migrator::down(conn.as_ref(), Some(1)).await.unwrap();

    for model in [
        edge("f1", "u1", "u2", FriendshipStatus::Pending, 0),
        edge("f2", "u2", "u1", FriendshipStatus::Accepted, 1),
        edge("f3", "u1", "u2", FriendshipStatus::Pending, 2),
        edge("f4", "u1", "u2", FriendshipStatus::Declined, 3),
        edge("f5", "u1", "u3", FriendshipStatus::Pending, 0),
        edge("f6", "u3", "u1", FriendshipStatus::Pending, 1),
    ] {
        friendships.create(model).await.unwrap();
    }

    Migrator::up(conn.as_ref(), None).await.unwrap();

    let mut ids: Vec<String> = friendships
        .find_for_user("u1")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["f2", "f4", "f6"]);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_one_reaction_per_user_per_post() {
    let db = TestDatabase::create_unique().await.unwrap();
    let conn = Arc::new(
        sea_orm::Database::connect(&db.config.database_url())
            .await
            .unwrap(),
    );
    let users = UserRepository::new(Arc::clone(&conn));
    let posts = PostRepository::new(Arc::clone(&conn));
    let reactions = ReactionRepository::new(Arc::clone(&conn));

    seed_user(&users, "u1", "alice").await;
    posts
        .create(post::ActiveModel {
            id: Set("p1".to_string()),
            user_id: Set("u1".to_string()),
            image_url: Set("https://cdn.example.com/p1.jpg".to_string()),
            caption: Set(None),
            venue_name: Set(None),
            latitude: Set(51.5),
            longitude: Set(-0.12),
            created_at: Set(Utc::now().into()),
        })
        .await
        .unwrap();

    let react = |id: &str, emoji: &str| reaction::ActiveModel {
        id: Set(id.to_string()),
        post_id: Set("p1".to_string()),
        user_id: Set("u1".to_string()),
        emoji: Set(emoji.to_string()),
        created_at: Set(Utc::now().into()),
    };

    reactions.create(react("r1", "🔥")).await.unwrap();
    let second = reactions.create(react("r2", "❤️")).await;
    assert!(matches!(second, Err(AppError::Conflict(_))));

    // Reacting to a post that does not exist is NotFound
    let mut orphan = react("r3", "🔥");
    orphan.post_id = Set("missing".to_string());
    assert!(matches!(
        reactions.create(orphan).await,
        Err(AppError::NotFound(_))
    ));

    db.drop_database().await.unwrap();
}

#[test]
fn test_config_from_env() {
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(!config.username.is_empty());
    assert!(!config.database.is_empty());
}

#[test]
fn test_postgres_url_format() {
    let config = TestDbConfig::default();
    let url = config.postgres_url();
    assert!(url.ends_with("/postgres"));
}

//! Post service: creating and deleting posts, and the map heatmap.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use geofeed_common::config::FeedConfig;
use geofeed_common::{AppError, AppResult, IdGenerator};
use geofeed_db::entities::post;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::services::store::{PostStore, Stores};

/// Most posts considered when building the heatmap.
const HEATMAP_POST_LIMIT: u64 = 1000;

/// Input for creating a post.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    /// Public URL of the already uploaded photo.
    #[validate(length(min = 1, max = 2048))]
    pub image_url: String,

    #[validate(length(max = 500))]
    pub caption: Option<String>,

    #[validate(length(max = 100))]
    pub venue_name: Option<String>,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

/// Number of posts whose coordinates round to the same point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    pub latitude: f64,
    pub longitude: f64,
    pub count: usize,
}

/// Group posts into heatmap cells, rounding coordinates to `precision` decimals.
///
/// Cells come back busiest first.
#[must_use]
pub fn bucket(posts: &[post::Model], precision: u32) -> Vec<HeatmapCell> {
    let scale = 10f64.powi(i32::try_from(precision).unwrap_or(i32::MAX).min(9));

    let key = |value: f64| (value * scale).round() as i64;

    let mut cells: HashMap<(i64, i64), usize> = HashMap::new();
    for post in posts {
        *cells
            .entry((key(post.latitude), key(post.longitude)))
            .or_insert(0) += 1;
    }

    let mut out: Vec<HeatmapCell> = cells
        .into_iter()
        .map(|((lat, lon), count)| HeatmapCell {
            latitude: lat as f64 / scale,
            longitude: lon as f64 / scale,
            count,
        })
        .collect();
    out.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.latitude.total_cmp(&b.latitude))
            .then_with(|| a.longitude.total_cmp(&b.longitude))
    });
    out
}

/// Post service for business logic.
#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostStore>,
    heatmap_precision: u32,
    id_gen: IdGenerator,
}

impl PostService {
    #[must_use]
    pub fn new(stores: &Stores, config: &FeedConfig) -> Self {
        Self {
            posts: Arc::clone(&stores.posts),
            heatmap_precision: config.heatmap_precision,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a post authored by `user_id`.
    pub async fn create_post(&self, user_id: &str, input: CreatePostInput) -> AppResult<post::Model> {
        if !input.latitude.is_finite() || !input.longitude.is_finite() {
            return Err(AppError::BadRequest("Coordinates must be finite".to_string()));
        }
        input.validate()?;

        let model = post::Model {
            id: self.id_gen.generate(),
            user_id: user_id.to_string(),
            image_url: input.image_url,
            caption: input.caption.filter(|c| !c.trim().is_empty()),
            venue_name: input.venue_name.filter(|v| !v.trim().is_empty()),
            latitude: input.latitude,
            longitude: input.longitude,
            created_at: Utc::now().into(),
        };

        let created = self.posts.insert_post(model).await?;
        tracing::info!(post_id = %created.id, user_id, "Created post");
        Ok(created)
    }

    /// Delete a post; only its author may.
    pub async fn delete_post(&self, post_id: &str, user_id: &str) -> AppResult<()> {
        self.posts.delete_post(post_id, user_id).await?;
        tracing::info!(post_id, user_id, "Deleted post");
        Ok(())
    }

    /// Heatmap over the recent posts of the viewer and their friends.
    pub async fn heatmap(&self, viewer_id: &str, friend_ids: &[String]) -> AppResult<Vec<HeatmapCell>> {
        let mut author_ids: Vec<String> = friend_ids.to_vec();
        author_ids.push(viewer_id.to_string());
        author_ids.sort();
        author_ids.dedup();

        let posts = self
            .posts
            .posts_by_authors(&author_ids, 0, HEATMAP_POST_LIMIT)
            .await?;
        Ok(bucket(&posts, self.heatmap_precision))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryStore, comment_at, post_at, profile, reaction_row};

    fn setup() -> (Arc<InMemoryStore>, PostService) {
        let store = Arc::new(InMemoryStore::new());
        store.seed_profile(profile("alice", "alice"));
        store.seed_profile(profile("bob", "bob"));
        let service = PostService::new(&Stores::shared(Arc::clone(&store)), &FeedConfig::default());
        (store, service)
    }

    fn input(latitude: f64, longitude: f64) -> CreatePostInput {
        CreatePostInput {
            image_url: "https://cdn.example.com/photo.jpg".to_string(),
            caption: Some("sunset".to_string()),
            venue_name: Some(String::new()),
            latitude,
            longitude,
        }
    }

    fn located(id: &str, user: &str, latitude: f64, longitude: f64) -> post::Model {
        let mut post = post_at(id, user, 0);
        post.latitude = latitude;
        post.longitude = longitude;
        post
    }

    #[tokio::test]
    async fn test_create_post() {
        let (store, service) = setup();

        let created = service.create_post("alice", input(51.5, -0.12)).await.unwrap();

        assert_eq!(created.user_id, "alice");
        assert_eq!(created.caption.as_deref(), Some("sunset"));
        assert_eq!(created.venue_name, None);
        assert_eq!(store.posts().len(), 1);
    }

    #[tokio::test]
    async fn test_create_post_rejects_bad_coordinates() {
        let (store, service) = setup();

        for (lat, lon) in [(91.0, 0.0), (-90.5, 0.0), (0.0, 180.1), (f64::NAN, 0.0)] {
            assert!(service.create_post("alice", input(lat, lon)).await.is_err());
        }

        let mut missing_image = input(0.0, 0.0);
        missing_image.image_url = String::new();
        assert!(matches!(
            service.create_post("alice", missing_image).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(store.calls("insert_post"), 0);
    }

    #[tokio::test]
    async fn test_only_author_deletes_and_children_cascade() {
        let (store, service) = setup();
        store.seed_post(post_at("p1", "alice", 0));
        store.seed_reaction(reaction_row("r1", "p1", "bob", "🔥"));
        store.seed_comment(comment_at("c1", "p1", "bob", None, 1));

        assert!(matches!(
            service.delete_post("p1", "bob").await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete_post("missing", "alice").await,
            Err(AppError::PostNotFound(_))
        ));

        service.delete_post("p1", "alice").await.unwrap();
        assert!(store.posts().is_empty());
        assert!(store.reactions().is_empty());
        assert!(store.comments().is_empty());
    }

    #[test]
    fn test_bucket_groups_nearby_posts() {
        let posts = vec![
            located("p1", "alice", 40.7128, -74.0060),
            located("p2", "alice", 40.7131, -74.0062),
            located("p3", "bob", 51.5072, -0.1276),
        ];

        let cells = bucket(&posts, 2);

        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].count, 2);
        assert!((cells[0].latitude - 40.71).abs() < 1e-9);
        assert!((cells[0].longitude - -74.01).abs() < 1e-9);
        assert_eq!(cells[1].count, 1);
    }

    #[tokio::test]
    async fn test_heatmap_covers_viewer_and_friends() {
        let (store, service) = setup();
        store.seed_profile(profile("carol", "carol"));
        store.seed_post(located("p1", "alice", 10.0, 10.0));
        store.seed_post(located("p2", "bob", 10.001, 10.001));
        store.seed_post(located("p3", "carol", 10.0, 10.0));

        let cells = service.heatmap("alice", &["bob".to_string()]).await.unwrap();

        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].count, 2);
    }
}

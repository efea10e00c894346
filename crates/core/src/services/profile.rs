//! Profile service: signup completion, profile edits and user search.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use geofeed_common::{AppError, AppResult};
use geofeed_db::entities::user;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::services::relationship::{RelationshipState, resolve};
use crate::services::session::Session;
use crate::services::store::{FriendshipStore, ProfileStore, Stores};

static USERNAME_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$"));

fn validate_username(username: &str) -> Result<(), ValidationError> {
    match USERNAME_RE.as_ref() {
        Ok(re) if re.is_match(username) => Ok(()),
        _ => Err(ValidationError::new("username_format")
            .with_message("may only contain a-z, 0-9 and _".into())),
    }
}

/// Input for completing signup.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSignupInput {
    #[validate(length(min = 3, max = 30), custom(function = "validate_username"))]
    pub username: String,

    #[validate(length(min = 1, max = 50))]
    pub display_name: String,

    #[validate(length(max = 2048))]
    pub avatar_url: Option<String>,
}

/// Input for editing a profile.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[validate(length(min = 1, max = 50))]
    pub display_name: Option<String>,

    /// `Some(None)` clears the avatar.
    pub avatar_url: Option<Option<String>>,
}

/// A search hit with the viewer's relationship to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSearchResult {
    pub profile: user::Model,
    pub relationship: RelationshipState,
}

/// Profile service for business logic.
#[derive(Clone)]
pub struct ProfileService {
    profiles: Arc<dyn ProfileStore>,
    friendships: Arc<dyn FriendshipStore>,
}

impl ProfileService {
    /// Default number of search results.
    pub const SEARCH_LIMIT: u64 = 20;

    #[must_use]
    pub fn new(stores: &Stores) -> Self {
        Self {
            profiles: Arc::clone(&stores.profiles),
            friendships: Arc::clone(&stores.friendships),
        }
    }

    /// Create the profile for a freshly authenticated account.
    ///
    /// The username is lowercased before validation.
    pub async fn complete_signup(
        &self,
        account_id: &str,
        mut input: CompleteSignupInput,
    ) -> AppResult<user::Model> {
        input.username = input.username.trim().to_lowercase();
        input.display_name = input.display_name.trim().to_string();
        input.validate()?;

        let profile = user::Model {
            id: account_id.to_string(),
            username: input.username.clone(),
            display_name: input.display_name,
            avatar_url: input.avatar_url.filter(|url| !url.is_empty()),
            created_at: Utc::now().into(),
        };

        let created = self
            .profiles
            .insert_profile(profile)
            .await
            .map_err(|err| match err {
                AppError::Conflict(_) => AppError::Conflict(format!(
                    "Username {} is already taken",
                    input.username
                )),
                other => other,
            })?;

        tracing::info!(user_id = %created.id, username = %created.username, "Completed signup");
        Ok(created)
    }

    /// Edit the signed-in user's own profile.
    pub async fn update_profile(
        &self,
        session: &mut Session,
        user_id: &str,
        mut input: UpdateProfileInput,
    ) -> AppResult<user::Model> {
        if session.viewer_id()? != user_id {
            return Err(AppError::Forbidden(
                "Cannot edit another user's profile".to_string(),
            ));
        }
        input.display_name = input.display_name.map(|name| name.trim().to_string());
        input.validate()?;

        let mut profile = self
            .profiles
            .find_profile(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))?;

        if let Some(display_name) = input.display_name {
            profile.display_name = display_name;
        }
        if let Some(avatar_url) = input.avatar_url {
            profile.avatar_url = avatar_url;
        }

        let updated = self.profiles.update_profile(profile).await?;
        session.update_viewer(updated.clone())?;
        Ok(updated)
    }

    /// Search users by username or display name, excluding the viewer.
    pub async fn search_users(
        &self,
        viewer_id: &str,
        query: &str,
        limit: u64,
    ) -> AppResult<Vec<UserSearchResult>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let (profiles, edges) = futures::try_join!(
            self.profiles.search_profiles(&query, Some(viewer_id), limit),
            self.friendships.edges_for(viewer_id),
        )?;

        Ok(profiles
            .into_iter()
            .map(|profile| UserSearchResult {
                relationship: resolve(viewer_id, &profile.id, &edges),
                profile,
            })
            .collect())
    }
}

//! Signed-in session context.
//!
//! The session is an explicit value handed to whoever needs the viewer,
//! populated at sign-in and cleared at sign-out.

use crate::services::store::ProfileStore;
use geofeed_common::{AppError, AppResult};
use geofeed_db::entities::user;

/// The current signed-in account, if any.
#[derive(Debug, Clone, Default)]
pub struct Session {
    viewer: Option<user::Model>,
}

impl Session {
    /// A session with nobody signed in.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self { viewer: None }
    }

    /// A session signed in as `profile`.
    #[must_use]
    pub const fn signed_in(profile: user::Model) -> Self {
        Self {
            viewer: Some(profile),
        }
    }

    /// Populate the session after authentication succeeds.
    pub fn sign_in(&mut self, profile: user::Model) {
        tracing::info!(user_id = %profile.id, "Signed in");
        self.viewer = Some(profile);
    }

    /// Clear the session.
    pub fn sign_out(&mut self) {
        if let Some(viewer) = self.viewer.take() {
            tracing::info!(user_id = %viewer.id, "Signed out");
        }
    }

    /// Replace the cached viewer profile after the viewer edited it.
    pub fn update_viewer(&mut self, profile: user::Model) -> AppResult<()> {
        if self.viewer_id()? != profile.id {
            return Err(AppError::Forbidden(
                "Cannot replace the session with another account".to_string(),
            ));
        }
        self.viewer = Some(profile);
        Ok(())
    }

    /// Whether someone is signed in.
    #[must_use]
    pub const fn is_signed_in(&self) -> bool {
        self.viewer.is_some()
    }

    /// The signed-in profile.
    pub fn viewer(&self) -> AppResult<&user::Model> {
        self.viewer.as_ref().ok_or(AppError::Unauthorized)
    }

    /// The signed-in account id.
    pub fn viewer_id(&self) -> AppResult<&str> {
        self.viewer().map(|v| v.id.as_str())
    }

    /// Re-read the viewer's profile from the store.
    ///
    /// A profile that no longer exists signs the session out.
    pub async fn refresh(&mut self, profiles: &dyn ProfileStore) -> AppResult<()> {
        let id = self.viewer_id()?.to_string();

        match profiles.find_profile(&id).await? {
            Some(profile) => {
                self.viewer = Some(profile);
                Ok(())
            }
            None => {
                self.sign_out();
                Err(AppError::UserNotFound(id))
            }
        }
    }
}

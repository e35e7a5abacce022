use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub mod handler;

/// Database model for a profile. Exactly one per account.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Query parameters for `GET /profiles/`
#[derive(Debug, Deserialize)]
pub struct ProfileFilter {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfile {
    #[validate(length(max = 2000, message = "Bio must be at most 2000 characters"))]
    pub bio: Option<String>,
    #[validate(length(max = 500, message = "Image path must be at most 500 characters"))]
    pub profile_image: Option<String>,
}

/// Profile as seen by the current user.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    /// Account email
    pub user: String,
    pub username: String,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub is_followed_by_current_user: bool,
    /// Number of profiles this profile follows
    pub follows: i64,
    pub followers: i64,
}

/// Post summary nested in a profile detail.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ProfilePost {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct ProfileDetailResponse {
    #[serde(flatten)]
    pub profile: ProfileResponse,
    pub posts: Vec<ProfilePost>,
}

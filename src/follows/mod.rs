use serde::Serialize;
use uuid::Uuid;

pub mod handler;

/// What a follow toggle does to the (follower → followee) edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowToggle {
    Follow,
    Unfollow,
}

impl FollowToggle {
    /// The toggle flips whatever edge state is currently stored.
    pub fn from_current(already_following: bool) -> Self {
        if already_following {
            FollowToggle::Unfollow
        } else {
            FollowToggle::Follow
        }
    }
}

/// Response for a user in followers/following lists
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct FollowProfileResponse {
    pub id: Uuid,
    pub username: String,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub followed_at: chrono::DateTime<chrono::Utc>,
}

/// Response for paginated followers/following lists
#[derive(Debug, Serialize)]
pub struct FollowListResponse {
    pub profiles: Vec<FollowProfileResponse>,
    pub total: i64,
    pub has_more: bool,
}

/// Response for a follow that created an edge
#[derive(Debug, Serialize)]
pub struct FollowActionResponse {
    pub following: bool,
    pub followers_count: i64,
}

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::jwt,
    error::AppError,
    filters::{contains_pattern, Page},
    profiles::{
        Profile, ProfileDetailResponse, ProfileFilter, ProfilePost, ProfileResponse,
        UpdateProfile,
    },
    response::ApiResponse,
};

/// Profile joined with its account and follow-graph counts
#[derive(FromRow)]
struct ProfileFromDb {
    id: Uuid,
    email: String,
    username: String,
    bio: Option<String>,
    profile_image: Option<String>,
    follows_count: i64,
    followers_count: i64,
    is_followed_by_current_user: bool,
}

impl From<ProfileFromDb> for ProfileResponse {
    fn from(p: ProfileFromDb) -> Self {
        ProfileResponse {
            id: p.id,
            user: p.email,
            username: p.username,
            bio: p.bio,
            profile_image: p.profile_image,
            is_followed_by_current_user: p.is_followed_by_current_user,
            follows: p.follows_count,
            followers: p.followers_count,
        }
    }
}

// $1 is always the viewing profile.
const PROFILE_SELECT: &str = r#"
    SELECT
        p.id, u.email, u.username, p.bio, p.profile_image,
        (SELECT COUNT(*) FROM follows f WHERE f.follower_id = p.id) AS follows_count,
        (SELECT COUNT(*) FROM follows f WHERE f.followee_id = p.id) AS followers_count,
        EXISTS (
            SELECT 1 FROM follows f WHERE f.follower_id = $1 AND f.followee_id = p.id
        ) AS is_followed_by_current_user
    FROM profiles p
    JOIN users u ON u.id = p.user_id
"#;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Maps the Postgres error code of a failed profile insert. A missing
/// account means the token outlived it.
fn profile_insert_error(code: Option<&str>) -> Option<AppError> {
    match code? {
        UNIQUE_VIOLATION => Some(AppError::Conflict("Profile already exists".to_string())),
        FOREIGN_KEY_VIOLATION => Some(AppError::Unauthorized),
        _ => None,
    }
}

/// Creates the profile of a freshly created account and makes it follow
/// itself, so the account's own posts show up in its feed.
pub async fn create_for_account(conn: &mut PgConnection, user_id: Uuid) -> Result<Uuid, AppError> {
    let profile = sqlx::query_as::<_, Profile>(
        "INSERT INTO profiles (id, user_id) VALUES ($1, $2) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        let code = e.as_database_error().and_then(|db| db.code()).map(|c| c.into_owned());
        profile_insert_error(code.as_deref()).unwrap_or_else(|| {
            tracing::error!("Failed to create profile: {:?}", e);
            AppError::InternalServerError
        })
    })?;

    sqlx::query("INSERT INTO follows (follower_id, followee_id) VALUES ($1, $1)")
        .bind(profile.id)
        .execute(&mut *conn)
        .await?;

    Ok(profile.id)
}

/// Resolves the profile owned by the authenticated account.
pub async fn current_profile_id(pool: &PgPool, user_id: Uuid) -> Result<Uuid, AppError> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM profiles WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Profile not found".to_string()))
}

async fn fetch_profile(
    pool: &PgPool,
    viewer_id: Uuid,
    profile_id: Uuid,
) -> Result<ProfileResponse, AppError> {
    let query = format!("{} WHERE p.id = $2", PROFILE_SELECT);

    let row = sqlx::query_as::<_, ProfileFromDb>(&query)
        .bind(viewer_id)
        .bind(profile_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Profile not found".to_string()))?;

    Ok(ProfileResponse::from(row))
}

/// Returns 404 when the profile is missing and 403 when it belongs to
/// another account.
async fn ensure_owner(pool: &PgPool, profile_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
    let owner_id = sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM profiles WHERE id = $1")
        .bind(profile_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Profile not found".to_string()))?;

    if owner_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// List profiles
/// GET /api/profiles?username=&email=
pub async fn list_profiles(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Query(filter): Query<ProfileFilter>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = current_profile_id(&pool, claims.sub).await?;

    let query = format!(
        r#"{}
        WHERE ($2::text IS NULL OR u.username ILIKE $2)
          AND ($3::text IS NULL OR u.email ILIKE $3)
        ORDER BY p.created_at ASC
        LIMIT $4 OFFSET $5
        "#,
        PROFILE_SELECT
    );

    let rows = sqlx::query_as::<_, ProfileFromDb>(&query)
        .bind(viewer_id)
        .bind(contains_pattern(filter.username.as_deref()))
        .bind(contains_pattern(filter.email.as_deref()))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&pool)
        .await?;

    let response: Vec<ProfileResponse> = rows.into_iter().map(ProfileResponse::from).collect();

    Ok(ApiResponse::success(response))
}

/// Ensure the caller's profile exists, recreating it with its self-follow
/// edge if it is missing.
/// POST /api/profiles
pub async fn create_profile(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
) -> Result<Response, AppError> {
    match current_profile_id(&pool, claims.sub).await {
        Ok(profile_id) => {
            let profile = fetch_profile(&pool, profile_id, profile_id).await?;
            return Ok(ApiResponse::success(profile).into_response());
        }
        Err(AppError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let mut tx = pool.begin().await?;
    let profile_id = create_for_account(&mut *tx, claims.sub).await?;
    tx.commit().await?;

    tracing::info!(user_id = %claims.sub, profile_id = %profile_id, "profile created");

    let profile = fetch_profile(&pool, profile_id, profile_id).await?;
    Ok(ApiResponse::success(profile).created().into_response())
}

/// Profile detail with its posts
/// GET /api/profiles/:id
pub async fn get_profile(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(profile_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = current_profile_id(&pool, claims.sub).await?;
    let profile = fetch_profile(&pool, viewer_id, profile_id).await?;

    let posts = sqlx::query_as::<_, ProfilePost>(
        r#"
        SELECT id, title, content, image, created_at
        FROM posts
        WHERE author_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(profile_id)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(ProfileDetailResponse { profile, posts }))
}

/// PATCH /api/profiles/:id
pub async fn update_profile(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(profile_id): Path<Uuid>,
    Json(payload): Json<UpdateProfile>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    ensure_owner(&pool, profile_id, claims.sub).await?;

    sqlx::query(
        r#"
        UPDATE profiles
        SET bio = COALESCE($1, bio),
            profile_image = COALESCE($2, profile_image)
        WHERE id = $3
        "#,
    )
    .bind(&payload.bio)
    .bind(&payload.profile_image)
    .bind(profile_id)
    .execute(&pool)
    .await?;

    let profile = fetch_profile(&pool, profile_id, profile_id).await?;
    Ok(ApiResponse::success(profile))
}

/// Deleting a profile deletes the owning account; follows, posts,
/// reactions and scheduled posts cascade with it.
/// DELETE /api/profiles/:id
pub async fn delete_profile(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(profile_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ensure_owner(&pool, profile_id, claims.sub).await?;

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(claims.sub)
        .execute(&pool)
        .await?;

    tracing::info!(user_id = %claims.sub, profile_id = %profile_id, "account deleted");

    Ok(ApiResponse::ok("Profile deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_errors_map_by_code() {
        assert!(matches!(
            profile_insert_error(Some(UNIQUE_VIOLATION)),
            Some(AppError::Conflict(_))
        ));
        assert!(matches!(
            profile_insert_error(Some(FOREIGN_KEY_VIOLATION)),
            Some(AppError::Unauthorized)
        ));
        assert!(profile_insert_error(Some("40001")).is_none());
        assert!(profile_insert_error(None).is_none());
    }
}

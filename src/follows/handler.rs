use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    auth::jwt,
    error::AppError,
    filters::Page,
    follows::{FollowActionResponse, FollowListResponse, FollowProfileResponse, FollowToggle},
    profiles::handler::current_profile_id,
    response::{ApiResponse, Toggled},
};

async fn require_profile(conn: &mut PgConnection, profile_id: Uuid) -> Result<(), AppError> {
    sqlx::query("SELECT 1 FROM profiles WHERE id = $1")
        .bind(profile_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Profile not found".to_string()))?;
    Ok(())
}

/// The self edge keeps a profile's own posts in its feed and is not togglable.
fn reject_self_target(actor_id: Uuid, target_id: Uuid) -> Result<(), AppError> {
    if actor_id == target_id {
        return Err(AppError::UnprocessableEntity(
            "You cannot follow or unfollow yourself".to_string(),
        ));
    }
    Ok(())
}

async fn followers_count(conn: &mut PgConnection, profile_id: Uuid) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE followee_id = $1")
        .bind(profile_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Follow a profile, or unfollow it when already following
/// POST /api/profiles/:id/follow
pub async fn follow_profile(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(target_id): Path<Uuid>,
) -> Result<Toggled<FollowActionResponse>, AppError> {
    let actor_id = current_profile_id(&pool, claims.sub).await?;
    reject_self_target(actor_id, target_id)?;

    let mut tx = pool.begin().await?;
    require_profile(&mut tx, target_id).await?;

    let already_following = sqlx::query(
        "SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2 FOR UPDATE",
    )
    .bind(actor_id)
    .bind(target_id)
    .fetch_optional(&mut *tx)
    .await?
    .is_some();

    let outcome = match FollowToggle::from_current(already_following) {
        FollowToggle::Follow => {
            sqlx::query(
                r#"
                INSERT INTO follows (follower_id, followee_id)
                VALUES ($1, $2)
                ON CONFLICT (follower_id, followee_id) DO NOTHING
                "#,
            )
            .bind(actor_id)
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

            let followers_count = followers_count(&mut tx, target_id).await?;
            Toggled::Set(ApiResponse::success(FollowActionResponse {
                following: true,
                followers_count,
            }))
        }
        FollowToggle::Unfollow => {
            sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
                .bind(actor_id)
                .bind(target_id)
                .execute(&mut *tx)
                .await?;
            Toggled::Cleared
        }
    };

    tx.commit().await?;

    tracing::debug!(
        follower = %actor_id,
        followee = %target_id,
        followed = !already_following,
        "follow toggled"
    );

    Ok(outcome)
}

/// Remove a follow edge; 404 when not following
/// POST /api/profiles/:id/unfollow
pub async fn unfollow_profile(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(target_id): Path<Uuid>,
) -> Result<Toggled<FollowActionResponse>, AppError> {
    let actor_id = current_profile_id(&pool, claims.sub).await?;
    reject_self_target(actor_id, target_id)?;

    let mut conn = pool.acquire().await?;
    require_profile(&mut conn, target_id).await?;

    let removed = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
        .bind(actor_id)
        .bind(target_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if removed == 0 {
        return Err(AppError::NotFound(
            "You are not following this profile".to_string(),
        ));
    }

    Ok(Toggled::Cleared)
}

#[derive(Clone, Copy)]
enum Direction {
    Followers,
    Following,
}

async fn list_edges(
    pool: &PgPool,
    profile_id: Uuid,
    page: &Page,
    direction: Direction,
) -> Result<FollowListResponse, AppError> {
    // (column matching the profile, column joined to the listed profiles)
    let (own, other) = match direction {
        Direction::Followers => ("followee_id", "follower_id"),
        Direction::Following => ("follower_id", "followee_id"),
    };

    let mut conn = pool.acquire().await?;
    require_profile(&mut conn, profile_id).await?;

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM follows WHERE {} = $1",
        own
    ))
    .bind(profile_id)
    .fetch_one(&mut *conn)
    .await?;

    let profiles = sqlx::query_as::<_, FollowProfileResponse>(&format!(
        r#"
        SELECT p.id, u.username, p.bio, p.profile_image, f.created_at AS followed_at
        FROM follows f
        JOIN profiles p ON f.{other} = p.id
        JOIN users u ON p.user_id = u.id
        WHERE f.{own} = $1
        ORDER BY f.created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(profile_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&mut *conn)
    .await?;

    Ok(FollowListResponse {
        profiles,
        total,
        has_more: page.has_more(total),
    })
}

/// GET /api/profiles/:id/followers
pub async fn get_followers(
    State(pool): State<PgPool>,
    _claims: jwt::Claims,
    Path(profile_id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, AppError> {
    let list = list_edges(&pool, profile_id, &page, Direction::Followers).await?;
    Ok(ApiResponse::success(list))
}

/// GET /api/profiles/:id/following
pub async fn get_following(
    State(pool): State<PgPool>,
    _claims: jwt::Claims,
    Path(profile_id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, AppError> {
    let list = list_edges(&pool, profile_id, &page, Direction::Following).await?;
    Ok(ApiResponse::success(list))
}

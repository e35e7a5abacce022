use axum::extract::{Path, State};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::jwt,
    error::AppError,
    profiles::handler::current_profile_id,
    reactions::{Reaction, ReactionAction, ReactionKind, ReactionResponse},
    response::{ApiResponse, Toggled},
};

/// Like a post
/// POST /api/posts/:id/like
pub async fn like_post(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(post_id): Path<Uuid>,
) -> Result<Toggled<ReactionResponse>, AppError> {
    react(&pool, &claims, post_id, ReactionAction::Like).await
}

/// Unlike (dislike) a post
/// POST /api/posts/:id/unlike
pub async fn unlike_post(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(post_id): Path<Uuid>,
) -> Result<Toggled<ReactionResponse>, AppError> {
    react(&pool, &claims, post_id, ReactionAction::Unlike).await
}

async fn react(
    pool: &PgPool,
    claims: &jwt::Claims,
    post_id: Uuid,
    action: ReactionAction,
) -> Result<Toggled<ReactionResponse>, AppError> {
    let profile_id = current_profile_id(pool, claims.sub).await?;

    let mut tx = pool.begin().await?;

    // Lock the post row so concurrent toggles on it serialize.
    sqlx::query("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    let current = sqlx::query_scalar::<_, ReactionKind>(
        "SELECT kind FROM post_reactions WHERE post_id = $1 AND profile_id = $2",
    )
    .bind(post_id)
    .bind(profile_id)
    .fetch_optional(&mut *tx)
    .await?;

    let next = Reaction::from_stored(current).apply(action);

    match next.stored() {
        Some(kind) => {
            sqlx::query(
                r#"
                INSERT INTO post_reactions (post_id, profile_id, kind)
                VALUES ($1, $2, $3)
                ON CONFLICT (post_id, profile_id)
                DO UPDATE SET kind = EXCLUDED.kind, created_at = NOW()
                "#,
            )
            .bind(post_id)
            .bind(profile_id)
            .bind(kind)
            .execute(&mut *tx)
            .await?;
        }
        None => {
            sqlx::query("DELETE FROM post_reactions WHERE post_id = $1 AND profile_id = $2")
                .bind(post_id)
                .bind(profile_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    let (likes, unlikes) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE kind = 'liked'),
            COUNT(*) FILTER (WHERE kind = 'unliked')
        FROM post_reactions
        WHERE post_id = $1
        "#,
    )
    .bind(post_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(post = %post_id, profile = %profile_id, reaction = ?next, "reaction recorded");

    if next == Reaction::Neutral {
        return Ok(Toggled::Cleared);
    }

    Ok(Toggled::Set(ApiResponse::success(ReactionResponse {
        post_id,
        reaction: next,
        likes,
        unlikes,
    })))
}

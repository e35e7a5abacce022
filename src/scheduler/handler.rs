use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::jwt,
    error::AppError,
    filters::Page,
    profiles::handler::current_profile_id,
    response::ApiResponse,
    scheduler::{ScheduledPost, ScheduledPostFilter, ScheduledPostStatus},
};

/// The caller's scheduled posts, soonest first
/// GET /api/scheduled-posts?status=
pub async fn list_scheduled_posts(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Query(filter): Query<ScheduledPostFilter>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, AppError> {
    let profile_id = current_profile_id(&pool, claims.sub).await?;

    let jobs = sqlx::query_as::<_, ScheduledPost>(
        r#"
        SELECT * FROM scheduled_posts
        WHERE profile_id = $1
          AND ($2::scheduled_post_status IS NULL OR status = $2)
        ORDER BY execute_at ASC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(profile_id)
    .bind(filter.status)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(jobs))
}

/// Cancel a pending scheduled post
/// DELETE /api/scheduled-posts/:id
pub async fn cancel_scheduled_post(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let profile_id = current_profile_id(&pool, claims.sub).await?;

    let cancelled = sqlx::query_as::<_, ScheduledPost>(
        r#"
        UPDATE scheduled_posts
        SET status = 'cancelled', updated_at = NOW()
        WHERE id = $1 AND profile_id = $2 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(profile_id)
    .fetch_optional(&pool)
    .await?;

    if let Some(job) = cancelled {
        tracing::info!(job = %job.id, "scheduled post cancelled");
        return Ok(ApiResponse::success(job));
    }

    let status = sqlx::query_scalar::<_, ScheduledPostStatus>(
        "SELECT status FROM scheduled_posts WHERE id = $1 AND profile_id = $2",
    )
    .bind(job_id)
    .bind(profile_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Scheduled post not found".to_string()))?;

    Err(AppError::Conflict(format!(
        "Scheduled post is already {}",
        status.as_str()
    )))
}

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::jwt,
    config::settings::Settings,
    error::AppError,
    filters::{contains_pattern, Page},
    posts::{
        insert_post, CreatePost, Post, PostDetailResponse, PostFilter, PostListItem,
        PostResponse, Reactor, UpdatePost,
    },
    profiles::handler::current_profile_id,
    reactions::{Reaction, ReactionKind},
    response::ApiResponse,
    scheduler,
};

/// Only posts by authors the viewer ($1) follows are visible.
const IN_FEED: &str =
    "EXISTS (SELECT 1 FROM follows f WHERE f.follower_id = $1 AND f.followee_id = p.author_id)";

/// Looks up a post visible to the viewer; anything outside the feed is 404.
async fn fetch_feed_post(pool: &PgPool, viewer_id: Uuid, post_id: Uuid) -> Result<Post, AppError> {
    let query = format!("SELECT p.* FROM posts p WHERE p.id = $2 AND {}", IN_FEED);

    sqlx::query_as::<_, Post>(&query)
        .bind(viewer_id)
        .bind(post_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))
}

async fn fetch_owned_post(pool: &PgPool, viewer_id: Uuid, post_id: Uuid) -> Result<Post, AppError> {
    let post = fetch_feed_post(pool, viewer_id, post_id).await?;
    if post.author_id != viewer_id {
        return Err(AppError::Forbidden);
    }
    Ok(post)
}

/// Feed of posts from followed profiles (including one's own)
/// GET /api/posts?title=&author=
pub async fn list_posts(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Query(filter): Query<PostFilter>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = current_profile_id(&pool, claims.sub).await?;

    let query = format!(
        r#"
        SELECT
            p.id, p.title, u.email AS author, p.content, p.image, p.created_at,
            COUNT(r.profile_id) FILTER (WHERE r.kind = 'liked') AS likes,
            COUNT(r.profile_id) FILTER (WHERE r.kind = 'unliked') AS unlikes
        FROM posts p
        JOIN profiles a ON a.id = p.author_id
        JOIN users u ON u.id = a.user_id
        LEFT JOIN post_reactions r ON r.post_id = p.id
        WHERE {}
          AND ($2::text IS NULL OR p.title ILIKE $2)
          AND ($3::text IS NULL OR u.username ILIKE $3 OR u.email ILIKE $3)
        GROUP BY p.id, u.id
        ORDER BY p.created_at DESC
        LIMIT $4 OFFSET $5
        "#,
        IN_FEED
    );

    let posts = sqlx::query_as::<_, PostListItem>(&query)
        .bind(viewer_id)
        .bind(contains_pattern(filter.title.as_deref()))
        .bind(contains_pattern(filter.author.as_deref()))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&pool)
        .await?;

    Ok(ApiResponse::success(posts))
}

/// Create a post now, or schedule it when `scheduled_time` is set
/// POST /api/posts
pub async fn create_post(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    claims: jwt::Claims,
    Json(payload): Json<CreatePost>,
) -> Result<Response, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let execute_at = payload
        .scheduled_time
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| scheduler::parse_scheduled_time(raw, settings.schedule_utc_offset))
        .transpose()?;

    let profile_id = current_profile_id(&pool, claims.sub).await?;

    if let Some(execute_at) = execute_at {
        let job = scheduler::enqueue(&pool, profile_id, &payload.new_post(), execute_at).await?;
        return Ok(ApiResponse::success_with_message(
            "Post will be created at the scheduled time.",
            job,
        )
        .accepted()
        .into_response());
    }

    let mut conn = pool.acquire().await?;
    let post = insert_post(&mut conn, Uuid::new_v4(), profile_id, &payload.new_post())
        .await?
        .ok_or(AppError::InternalServerError)?;

    tracing::info!(post = %post.id, author = %profile_id, "post created");

    Ok(ApiResponse::success(PostResponse::from(post))
        .created()
        .into_response())
}

#[derive(FromRow)]
struct ReactorRow {
    user_email: String,
    kind: ReactionKind,
    profile_id: Uuid,
}

/// Post detail with the profiles that liked/unliked it
/// GET /api/posts/:id
pub async fn get_post(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = current_profile_id(&pool, claims.sub).await?;
    let post = fetch_feed_post(&pool, viewer_id, post_id).await?;

    let author = sqlx::query_scalar::<_, String>(
        "SELECT u.email FROM profiles p JOIN users u ON u.id = p.user_id WHERE p.id = $1",
    )
    .bind(post.author_id)
    .fetch_one(&pool)
    .await?;

    let reactors = sqlx::query_as::<_, ReactorRow>(
        r#"
        SELECT u.email AS user_email, r.kind, r.profile_id
        FROM post_reactions r
        JOIN profiles p ON p.id = r.profile_id
        JOIN users u ON u.id = p.user_id
        WHERE r.post_id = $1
        ORDER BY r.created_at ASC
        "#,
    )
    .bind(post_id)
    .fetch_all(&pool)
    .await?;

    let my_reaction = Reaction::from_stored(
        reactors
            .iter()
            .find(|r| r.profile_id == viewer_id)
            .map(|r| r.kind),
    );

    let (liked, unliked): (Vec<ReactorRow>, Vec<ReactorRow>) = reactors
        .into_iter()
        .partition(|r| r.kind == ReactionKind::Liked);

    let to_reactors = |rows: Vec<ReactorRow>| -> Vec<Reactor> {
        rows.into_iter()
            .map(|r| Reactor {
                user_email: r.user_email,
            })
            .collect()
    };

    Ok(ApiResponse::success(PostDetailResponse {
        id: post.id,
        title: post.title,
        author,
        author_id: post.author_id,
        content: post.content,
        image: post.image,
        created_at: post.created_at,
        likes: to_reactors(liked),
        unlikes: to_reactors(unliked),
        my_reaction,
    }))
}

/// PATCH /api/posts/:id
pub async fn update_post(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<UpdatePost>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let viewer_id = current_profile_id(&pool, claims.sub).await?;
    fetch_owned_post(&pool, viewer_id, post_id).await?;

    // created_at is never touched
    let post = sqlx::query_as::<_, Post>(
        r#"
        UPDATE posts
        SET title = COALESCE($1, title),
            content = COALESCE($2, content),
            image = COALESCE($3, image)
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.content)
    .bind(&payload.image)
    .bind(post_id)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::success(PostResponse::from(post)))
}

/// DELETE /api/posts/:id
pub async fn delete_post(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = current_profile_id(&pool, claims.sub).await?;
    fetch_owned_post(&pool, viewer_id, post_id).await?;

    // post_reactions cascade
    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post_id)
        .execute(&pool)
        .await?;

    Ok(ApiResponse::ok("Post deleted"))
}

use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;
use validator::Validate;

use crate::reactions::Reaction;

pub mod handler;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Fields needed to write a post, whether now or from a scheduled job.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePost {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title must be between 1 and 200 characters"
    ))]
    pub title: String,
    #[validate(length(min = 1, message = "Content cannot be empty"))]
    pub content: String,
    #[validate(length(max = 500, message = "Image path must be at most 500 characters"))]
    pub image: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS`; defers creation when present.
    pub scheduled_time: Option<String>,
}

impl CreatePost {
    pub fn new_post(&self) -> NewPost {
        NewPost {
            title: self.title.clone(),
            content: self.content.clone(),
            image: self.image.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePost {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title must be between 1 and 200 characters"
    ))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Content cannot be empty"))]
    pub content: Option<String>,
    #[validate(length(max = 500, message = "Image path must be at most 500 characters"))]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostFilter {
    pub title: Option<String>,
    /// Matches the author's username or email
    pub author: Option<String>,
}

/// Returned by create and update.
#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Post> for PostResponse {
    fn from(p: Post) -> Self {
        PostResponse {
            id: p.id,
            title: p.title,
            content: p.content,
            image: p.image,
            created_at: p.created_at,
        }
    }
}

/// Feed entry with reaction counts
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PostListItem {
    pub id: Uuid,
    pub title: String,
    /// Author's account email
    pub author: String,
    pub content: String,
    pub image: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub likes: i64,
    pub unlikes: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Reactor {
    pub user_email: String,
}

#[derive(Debug, Serialize)]
pub struct PostDetailResponse {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub author_id: Uuid,
    pub content: String,
    pub image: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub likes: Vec<Reactor>,
    pub unlikes: Vec<Reactor>,
    pub my_reaction: Reaction,
}

/// Inserts a post under a caller-chosen id. Returns `None` when a post with
/// that id already exists, which makes replays of the same id harmless.
pub async fn insert_post(
    conn: &mut PgConnection,
    id: Uuid,
    author_id: Uuid,
    post: &NewPost,
) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(
        r#"
        INSERT INTO posts (id, author_id, title, content, image, created_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        ON CONFLICT (id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(author_id)
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.image)
    .fetch_optional(conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(title: &str, content: &str) -> CreatePost {
        CreatePost {
            title: title.to_string(),
            content: content.to_string(),
            image: None,
            scheduled_time: None,
        }
    }

    #[test]
    fn create_payload_reports_field_errors() {
        assert!(payload("Hello", "world").validate().is_ok());

        let errors = payload("", "").validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("content"));

        let long_title = "x".repeat(201);
        assert!(payload(&long_title, "body").validate().is_err());
    }

    #[test]
    fn update_payload_allows_partial_fields() {
        let update = UpdatePost {
            title: None,
            content: Some("edited".into()),
            image: None,
        };
        assert!(update.validate().is_ok());

        let blank = UpdatePost {
            title: Some(String::new()),
            content: None,
            image: None,
        };
        assert!(blank.validate().is_err());
    }
}

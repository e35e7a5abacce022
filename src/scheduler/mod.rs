use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::Type, PgPool};
use uuid::Uuid;

use crate::{error::AppError, posts::NewPost};

pub mod handler;
pub mod worker;

pub const SCHEDULED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const RETRY_BASE_SECS: i64 = 30;
const RETRY_MAX_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "scheduled_post_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScheduledPostStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl ScheduledPostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduledPostStatus::Pending => "pending",
            ScheduledPostStatus::Completed => "completed",
            ScheduledPostStatus::Failed => "failed",
            ScheduledPostStatus::Cancelled => "cancelled",
        }
    }
}

/// A deferred post creation. The worker claims due rows and applies the
/// retry policy below.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScheduledPost {
    /// Also the id of the post once created, so a replayed job cannot
    /// create a second post
    pub id: Uuid,
    pub profile_id: Uuid,
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub execute_at: DateTime<Utc>,
    pub status: ScheduledPostStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledPost {
    pub fn new_post(&self) -> NewPost {
        NewPost {
            title: self.title.clone(),
            content: self.content.clone(),
            image: self.image.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScheduledPostFilter {
    pub status: Option<ScheduledPostStatus>,
}

/// Parses a client-supplied `YYYY-MM-DD HH:MM:SS` in the given local offset.
pub fn parse_scheduled_time(raw: &str, offset: FixedOffset) -> Result<DateTime<Utc>, AppError> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), SCHEDULED_TIME_FORMAT).map_err(|_| {
        AppError::UnprocessableEntity(format!(
            "scheduled_time: expected format YYYY-MM-DD HH:MM:SS, got {:?}",
            raw
        ))
    })?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            AppError::UnprocessableEntity(format!("scheduled_time: {:?} is ambiguous", raw))
        })
}

/// What to do with a job whose execution just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// `attempts` counts the attempt that just failed.
pub fn retry_decision(attempts: i32, max_attempts: i32, permanent: bool) -> RetryDecision {
    if permanent || attempts >= max_attempts {
        RetryDecision::GiveUp
    } else {
        RetryDecision::RetryAfter(backoff(attempts) + jitter())
    }
}

/// Exponential backoff starting at 30s, capped at one hour.
pub fn backoff(attempts: i32) -> Duration {
    let exp = attempts.saturating_sub(1).clamp(0, 16) as u32;
    let secs = RETRY_BASE_SECS
        .saturating_mul(2_i64.saturating_pow(exp))
        .min(RETRY_MAX_SECS);
    Duration::seconds(secs)
}

fn jitter() -> Duration {
    Duration::milliseconds(rand::thread_rng().gen_range(0..5_000))
}

/// Stores a pending job and returns it.
pub async fn enqueue(
    pool: &PgPool,
    profile_id: Uuid,
    post: &NewPost,
    execute_at: DateTime<Utc>,
) -> Result<ScheduledPost, AppError> {
    let job = sqlx::query_as::<_, ScheduledPost>(
        r#"
        INSERT INTO scheduled_posts (id, profile_id, title, content, image, execute_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(profile_id)
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.image)
    .bind(execute_at)
    .fetch_one(pool)
    .await?;

    tracing::info!(job = %job.id, profile = %profile_id, execute_at = %execute_at, "post scheduled");

    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn offset(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }

    #[test]
    fn parses_local_time_into_utc() {
        let at = parse_scheduled_time("2030-01-15 12:30:00", offset(2)).unwrap();
        assert_eq!(at.year(), 2030);
        assert_eq!(at.day(), 15);
        assert_eq!(at.hour(), 10);
        assert_eq!(at.minute(), 30);
    }

    #[test]
    fn utc_offset_is_identity() {
        let at = parse_scheduled_time(" 2030-01-15 00:00:00 ", offset(0)).unwrap();
        assert_eq!(at.to_rfc3339(), "2030-01-15T00:00:00+00:00");
    }

    #[test]
    fn malformed_time_is_a_validation_error() {
        for raw in ["tomorrow", "2030-01-15T12:00:00", "2030-13-01 00:00:00", ""] {
            assert!(matches!(
                parse_scheduled_time(raw, offset(0)),
                Err(AppError::UnprocessableEntity(_))
            ));
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff(1), Duration::seconds(30));
        assert_eq!(backoff(2), Duration::seconds(60));
        assert_eq!(backoff(3), Duration::seconds(120));
        assert_eq!(backoff(50), Duration::seconds(RETRY_MAX_SECS));

        for n in 1..20 {
            assert!(backoff(n + 1) >= backoff(n));
        }
    }

    #[test]
    fn retry_decision_respects_budget() {
        assert_eq!(retry_decision(5, 5, false), RetryDecision::GiveUp);
        assert_eq!(retry_decision(1, 5, true), RetryDecision::GiveUp);

        match retry_decision(1, 5, false) {
            RetryDecision::RetryAfter(delay) => {
                assert!(delay >= Duration::seconds(30));
                assert!(delay < Duration::seconds(35));
            }
            RetryDecision::GiveUp => panic!("expected a retry"),
        }
    }
}

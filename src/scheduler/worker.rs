use anyhow::{Context, Result};
use sqlx::{Connection, PgConnection, PgPool};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    config::settings::SchedulerSettings,
    posts::insert_post,
    scheduler::{retry_decision, RetryDecision, ScheduledPost},
};

/// Why a job attempt did not produce its post.
#[derive(Debug)]
enum JobError {
    /// Retrying cannot help, e.g. the author is gone.
    Permanent(String),
    Transient(sqlx::Error),
}

impl JobError {
    fn is_permanent(&self) -> bool {
        matches!(self, JobError::Permanent(_))
    }

    fn message(&self) -> String {
        match self {
            JobError::Permanent(msg) => msg.clone(),
            JobError::Transient(e) => e.to_string(),
        }
    }
}

impl From<sqlx::Error> for JobError {
    fn from(e: sqlx::Error) -> Self {
        JobError::Transient(e)
    }
}

/// Spawns the polling loop. Flip `shutdown` to `true` to stop it after the
/// current batch.
pub fn start(
    pool: PgPool,
    settings: SchedulerSettings,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "scheduled post worker started (interval={:?}, batch={}, max_attempts={})",
            settings.poll_interval, settings.batch_size, settings.max_attempts
        );

        let mut ticker = tokio::time::interval(settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("scheduled post worker stopped");
                    break;
                }
                _ = ticker.tick() => {
                    debug!("scheduled post scan");
                    match run_due_jobs(&pool, &settings).await {
                        Ok(0) => {}
                        Ok(n) => info!("scheduled post worker: processed {n} jobs"),
                        Err(e) => error!("scheduled post worker error: {e:#}"),
                    }
                }
            }
        }
    })
}

/// Claims one batch of due jobs and runs them. Rows stay locked until the
/// batch commits, so concurrent workers skip them.
pub async fn run_due_jobs(pool: &PgPool, settings: &SchedulerSettings) -> Result<usize> {
    let mut tx = pool.begin().await.context("begin job batch")?;

    let jobs = sqlx::query_as::<_, ScheduledPost>(
        r#"
        SELECT * FROM scheduled_posts
        WHERE status = 'pending' AND execute_at <= NOW()
        ORDER BY execute_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(settings.batch_size)
    .fetch_all(&mut *tx)
    .await
    .context("claim due jobs")?;

    for job in &jobs {
        // Savepoint per job so one failure does not abort the batch.
        let mut attempt = Connection::begin(&mut *tx).await.context("open job savepoint")?;

        match execute(&mut attempt, job).await {
            Ok(()) => {
                attempt.commit().await.context("commit job")?;
                mark_completed(&mut tx, job).await?;
            }
            Err(err) => {
                attempt.rollback().await.context("roll back job")?;
                mark_failed_attempt(&mut tx, job, &err, settings.max_attempts).await?;
            }
        }
    }

    tx.commit().await.context("commit job batch")?;

    Ok(jobs.len())
}

async fn execute(conn: &mut PgConnection, job: &ScheduledPost) -> Result<(), JobError> {
    // The author may have been deleted since the job was queued.
    let author_exists = sqlx::query("SELECT 1 FROM profiles WHERE id = $1")
        .bind(job.profile_id)
        .fetch_optional(&mut *conn)
        .await?
        .is_some();

    if !author_exists {
        return Err(JobError::Permanent(format!(
            "profile {} no longer exists",
            job.profile_id
        )));
    }

    match insert_post(&mut *conn, job.id, job.profile_id, &job.new_post()).await? {
        Some(post) => info!(job = %job.id, post = %post.id, "scheduled post created"),
        None => debug!(job = %job.id, "scheduled post already existed"),
    }

    Ok(())
}

async fn mark_completed(conn: &mut PgConnection, job: &ScheduledPost) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = 'completed', attempts = attempts + 1, last_error = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job.id)
    .execute(&mut *conn)
    .await
    .context("mark job completed")?;
    Ok(())
}

async fn mark_failed_attempt(
    conn: &mut PgConnection,
    job: &ScheduledPost,
    err: &JobError,
    max_attempts: i32,
) -> Result<()> {
    let attempts = job.attempts + 1;
    let message = err.message();

    match retry_decision(attempts, max_attempts, err.is_permanent()) {
        RetryDecision::GiveUp => {
            error!(job = %job.id, attempts, "scheduled post failed permanently: {}", message);
            sqlx::query(
                r#"
                UPDATE scheduled_posts
                SET status = 'failed', attempts = $2, last_error = $3, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(job.id)
            .bind(attempts)
            .bind(&message)
            .execute(&mut *conn)
            .await
            .context("mark job failed")?;
        }
        RetryDecision::RetryAfter(delay) => {
            let retry_at = chrono::Utc::now() + delay;
            warn!(job = %job.id, attempts, %retry_at, "scheduled post attempt failed: {}", message);
            sqlx::query(
                r#"
                UPDATE scheduled_posts
                SET attempts = $2, last_error = $3, execute_at = $4, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(job.id)
            .bind(attempts)
            .bind(&message)
            .bind(retry_at)
            .execute(&mut *conn)
            .await
            .context("reschedule job")?;
        }
    }

    Ok(())
}

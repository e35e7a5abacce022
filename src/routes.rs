use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{normalize_path::NormalizePath, trace::TraceLayer};

use crate::{auth, follows, posts, profiles, reactions, scheduler, AppState};

pub fn router(state: AppState) -> Router {
    let auth_router = Router::new()
        .route("/sign-in", post(auth::handler::login))
        .route("/sign-up", post(auth::handler::signup))
        .route("/me", get(auth::handler::get_me));

    let profile_router = Router::new()
        .route(
            "/",
            get(profiles::handler::list_profiles).post(profiles::handler::create_profile),
        )
        .route(
            "/:id",
            get(profiles::handler::get_profile)
                .patch(profiles::handler::update_profile)
                .delete(profiles::handler::delete_profile),
        )
        .route("/:id/follow", post(follows::handler::follow_profile))
        .route("/:id/unfollow", post(follows::handler::unfollow_profile))
        .route("/:id/followers", get(follows::handler::get_followers))
        .route("/:id/following", get(follows::handler::get_following));

    let post_router = Router::new()
        .route(
            "/",
            get(posts::handler::list_posts).post(posts::handler::create_post),
        )
        .route(
            "/:id",
            get(posts::handler::get_post)
                .patch(posts::handler::update_post)
                .delete(posts::handler::delete_post),
        )
        .route("/:id/like", post(reactions::handler::like_post))
        .route("/:id/unlike", post(reactions::handler::unlike_post));

    let scheduled_router = Router::new()
        .route("/", get(scheduler::handler::list_scheduled_posts))
        .route(
            "/:id",
            axum::routing::delete(scheduler::handler::cancel_scheduled_post),
        );

    Router::new()
        .route("/", get(|| async { "ok" }))
        .nest("/api/auth", auth_router)
        .nest("/api/profiles", profile_router)
        .nest("/api/posts", post_router)
        .nest("/api/scheduled-posts", scheduled_router)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The router with trailing slashes trimmed before routing, so
/// `/api/posts/` and `/api/posts` are the same endpoint.
pub fn service(state: AppState) -> NormalizePath<Router> {
    NormalizePath::trim_trailing_slash(router(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt;
    use crate::config::settings::{SchedulerSettings, Settings};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use chrono::FixedOffset;
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;
    use std::net::SocketAddr;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "test-secret";

    // The pool never connects; every request below is answered before
    // any query runs.
    fn test_service() -> NormalizePath<Router> {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let settings = Settings {
            port: 0,
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: "postgres://localhost/unused".to_string(),
            database_max_connections: 1,
            jwt_secret: SECRET.to_string(),
            schedule_utc_offset: FixedOffset::east_opt(0).unwrap(),
            scheduler: SchedulerSettings::default(),
        };
        service(AppState { pool, settings })
    }

    fn bearer() -> String {
        format!("Bearer {}", jwt::create_token(Uuid::new_v4(), SECRET).unwrap())
    }

    async fn send(request: Request<Body>) -> StatusCode {
        test_service().oneshot(request).await.unwrap().status()
    }

    fn json_request(method: Method, uri: &str, auth: Option<String>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn health_check_is_public() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(send(request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn feed_requires_a_token() {
        let request = Request::builder()
            .uri("/api/posts")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn trailing_slash_reaches_the_same_route() {
        let request = Request::builder()
            .uri("/api/posts/")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(request).await, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/profiles/{}/follow/", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn forged_token_is_rejected() {
        let forged = format!(
            "Bearer {}",
            jwt::create_token(Uuid::new_v4(), "someone-else").unwrap()
        );
        let request = Request::builder()
            .uri("/api/profiles")
            .header(header::AUTHORIZATION, forged)
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_scheduled_time_is_unprocessable() {
        let request = json_request(
            Method::POST,
            "/api/posts",
            Some(bearer()),
            json!({
                "title": "Later",
                "content": "body",
                "scheduled_time": "next tuesday"
            }),
        );
        assert_eq!(send(request).await, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn empty_post_title_is_unprocessable() {
        let request = json_request(
            Method::POST,
            "/api/posts",
            Some(bearer()),
            json!({ "title": "", "content": "body" }),
        );
        assert_eq!(send(request).await, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn invalid_sign_up_is_unprocessable() {
        let request = json_request(
            Method::POST,
            "/api/auth/sign-up",
            None,
            json!({ "username": "x", "email": "nope", "password": "short" }),
        );
        assert_eq!(send(request).await, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let request = Request::builder()
            .uri("/api/nothing-here")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(request).await, StatusCode::NOT_FOUND);
    }
}

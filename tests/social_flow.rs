// End-to-end flows against a running server backed by a migrated database.
//
// Start the server, then run `cargo test -- --ignored`. Set `API_URL` to
// point somewhere other than `http://127.0.0.1:3000`.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

fn base_url() -> String {
    std::env::var("API_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string())
}

struct Account {
    token: String,
    email: String,
    profile_id: String,
}

async fn sign_up(client: &Client, prefix: &str) -> Account {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let username = format!("{}_{}", prefix, &suffix[..12]);
    let email = format!("{}@example.com", username);

    let resp = client
        .post(format!("{}/api/auth/sign-up", base_url()))
        .json(&json!({
            "username": username,
            "email": email,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to sign up");

    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = resp.json::<Value>().await.unwrap();

    Account {
        token: body["data"]["token"].as_str().unwrap().to_string(),
        email,
        profile_id: body["data"]["user"]["profile_id"]
            .as_str()
            .unwrap()
            .to_string(),
    }
}

async fn feed_titles(client: &Client, account: &Account) -> Vec<String> {
    let body = client
        .get(format!("{}/api/posts/", base_url()))
        .bearer_auth(&account.token)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();

    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
#[ignore = "requires a running server and database"]
async fn follow_post_and_react_flow() {
    let client = Client::new();

    // 1. New account follows itself
    let u = sign_up(&client, "u").await;
    let profile = client
        .get(format!("{}/api/profiles/{}/", base_url(), u.profile_id))
        .bearer_auth(&u.token)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(profile["data"]["is_followed_by_current_user"], true);
    assert_eq!(profile["data"]["follows"], 1);
    assert_eq!(profile["data"]["user"], u.email.as_str());

    // 2. Own post shows up in own feed
    let title = format!("Hello {}", uuid::Uuid::new_v4());
    let created = client
        .post(format!("{}/api/posts/", base_url()))
        .bearer_auth(&u.token)
        .json(&json!({ "title": title, "content": "first post" }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let post_id = created.json::<Value>().await.unwrap()["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(feed_titles(&client, &u).await.contains(&title));

    // 3. V does not see it until following U
    let v = sign_up(&client, "v").await;
    assert!(!feed_titles(&client, &v).await.contains(&title));

    let follow = client
        .post(format!("{}/api/profiles/{}/follow/", base_url(), u.profile_id))
        .bearer_auth(&v.token)
        .send()
        .await
        .unwrap();
    assert_eq!(follow.status(), StatusCode::OK);
    assert!(feed_titles(&client, &v).await.contains(&title));

    // 4. Like, then unlike
    let like = client
        .post(format!("{}/api/posts/{}/like/", base_url(), post_id))
        .bearer_auth(&v.token)
        .send()
        .await
        .unwrap();
    assert_eq!(like.status(), StatusCode::OK);
    let like = like.json::<Value>().await.unwrap();
    assert_eq!(like["data"]["likes"], 1);
    assert_eq!(like["data"]["unlikes"], 0);

    let unlike = client
        .post(format!("{}/api/posts/{}/unlike/", base_url(), post_id))
        .bearer_auth(&v.token)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(unlike["data"]["likes"], 0);
    assert_eq!(unlike["data"]["unlikes"], 1);

    // Unliking again clears the reaction
    let cleared = client
        .post(format!("{}/api/posts/{}/unlike/", base_url(), post_id))
        .bearer_auth(&v.token)
        .send()
        .await
        .unwrap();
    assert_eq!(cleared.status(), StatusCode::NO_CONTENT);

    // 5. Second follow toggle removes the edge; explicit unfollow then 404s
    let toggle_off = client
        .post(format!("{}/api/profiles/{}/follow/", base_url(), u.profile_id))
        .bearer_auth(&v.token)
        .send()
        .await
        .unwrap();
    assert_eq!(toggle_off.status(), StatusCode::NO_CONTENT);

    let unfollow = client
        .post(format!("{}/api/profiles/{}/unfollow/", base_url(), u.profile_id))
        .bearer_auth(&v.token)
        .send()
        .await
        .unwrap();
    assert_eq!(unfollow.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires a running server and database"]
async fn scheduled_post_is_deferred() {
    let client = Client::new();
    let u = sign_up(&client, "sched").await;

    let title = format!("Later {}", uuid::Uuid::new_v4());
    let in_an_hour = (chrono::Utc::now() + chrono::Duration::hours(1))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    let resp = client
        .post(format!("{}/api/posts/", base_url()))
        .bearer_auth(&u.token)
        .json(&json!({
            "title": title,
            "content": "from the future",
            "scheduled_time": in_an_hour
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = resp.json::<Value>().await.unwrap();
    assert_eq!(body["message"], "Post will be created at the scheduled time.");
    assert_eq!(body["data"]["status"], "pending");
    let job_id = body["data"]["id"].as_str().unwrap().to_string();

    assert!(!feed_titles(&client, &u).await.contains(&title));

    let cancelled = client
        .delete(format!("{}/api/scheduled-posts/{}/", base_url(), job_id))
        .bearer_auth(&u.token)
        .send()
        .await
        .unwrap();
    assert_eq!(cancelled.status(), StatusCode::OK);

    let again = client
        .delete(format!("{}/api/scheduled-posts/{}/", base_url(), job_id))
        .bearer_auth(&u.token)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

async fn feed_titles_where(
    client: &Client,
    account: &Account,
    query: &[(&str, &str)],
) -> Vec<String> {
    let body = client
        .get(format!("{}/api/posts/", base_url()))
        .query(query)
        .bearer_auth(&account.token)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();

    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap().to_string())
        .collect()
}

async fn create_post(client: &Client, account: &Account, title: &str) {
    let resp = client
        .post(format!("{}/api/posts/", base_url()))
        .bearer_auth(&account.token)
        .json(&json!({ "title": title, "content": "body" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

// Times are sent in UTC, so the server must run with the default
// SCHEDULE_UTC_OFFSET and its worker enabled.
#[tokio::test]
#[ignore = "requires a running server and database"]
async fn scheduled_post_is_published_by_the_worker() {
    let client = Client::new();
    let u = sign_up(&client, "pub").await;

    let title = format!("Soon {}", uuid::Uuid::new_v4());
    let in_two_seconds = (chrono::Utc::now() + chrono::Duration::seconds(2))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    let resp = client
        .post(format!("{}/api/posts/", base_url()))
        .bearer_auth(&u.token)
        .json(&json!({
            "title": title,
            "content": "published later",
            "scheduled_time": in_two_seconds
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let job_id = resp.json::<Value>().await.unwrap()["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let mut published = false;
    for _ in 0..60 {
        if feed_titles(&client, &u).await.contains(&title) {
            published = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
    assert!(published, "scheduled post never reached the feed");

    // The post keeps the job's id
    let post = client
        .get(format!("{}/api/posts/{}/", base_url(), job_id))
        .bearer_auth(&u.token)
        .send()
        .await
        .unwrap();
    assert_eq!(post.status(), StatusCode::OK);
    assert_eq!(post.json::<Value>().await.unwrap()["data"]["title"], title.as_str());

    let jobs = client
        .get(format!("{}/api/scheduled-posts/", base_url()))
        .bearer_auth(&u.token)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    let job = jobs["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|j| j["id"] == job_id.as_str())
        .expect("job missing from list")
        .clone();
    assert_eq!(job["status"], "completed");
    assert_eq!(job["attempts"], 1);

    let cancel = client
        .delete(format!("{}/api/scheduled-posts/{}/", base_url(), job_id))
        .bearer_auth(&u.token)
        .send()
        .await
        .unwrap();
    assert_eq!(cancel.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "requires a running server and database"]
async fn feed_filters_match_wildcards_literally() {
    let client = Client::new();
    let u = sign_up(&client, "filt").await;
    let tag = uuid::Uuid::new_v4().simple().to_string();

    let percent = format!("50% off {}", tag);
    let plain = format!("500 off {}", tag);
    let underscore = format!("snake_case {}", tag);
    for title in [&percent, &plain, &underscore] {
        create_post(&client, &u, title).await;
    }

    let by_percent = feed_titles_where(&client, &u, &[("title", "%")]).await;
    assert_eq!(by_percent, vec![percent.clone()]);

    let by_underscore = feed_titles_where(&client, &u, &[("title", "_")]).await;
    assert_eq!(by_underscore, vec![underscore.clone()]);

    // Whitespace in the needle is part of the match
    let spaced = feed_titles_where(&client, &u, &[("title", " off ")]).await;
    assert_eq!(spaced.len(), 2);
    assert!(spaced.contains(&percent) && spaced.contains(&plain));

    let username = u.email.split('@').next().unwrap().to_string();
    let by_author = feed_titles_where(&client, &u, &[("author", &username[2..])]).await;
    assert_eq!(by_author.len(), 3);

    let combined = feed_titles_where(
        &client,
        &u,
        &[("author", &username[2..]), ("title", "500")],
    )
    .await;
    assert_eq!(combined, vec![plain.clone()]);

    let stranger = feed_titles_where(&client, &u, &[("author", "nobody-by-this-name")]).await;
    assert!(stranger.is_empty());
}

#[tokio::test]
#[ignore = "requires a running server and database"]
async fn token_of_deleted_account_is_unauthorized() {
    let client = Client::new();
    let u = sign_up(&client, "gone").await;

    let deleted = client
        .delete(format!("{}/api/profiles/{}/", base_url(), u.profile_id))
        .bearer_auth(&u.token)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    let recreate = client
        .post(format!("{}/api/profiles/", base_url()))
        .bearer_auth(&u.token)
        .send()
        .await
        .unwrap();
    assert_eq!(recreate.status(), StatusCode::UNAUTHORIZED);
}

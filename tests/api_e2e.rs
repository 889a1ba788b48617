//! End-to-end tests: the real router on an ephemeral port, driven over HTTP.
//!
//! Tests cover:
//! - Registration, login and session resolution
//! - The like toggle and ownership enforcement on posts
//! - Comment authorship
//! - Cascading deletes of posts and accounts
//! - User search
//! - Photo upload, serving and replacement

use agora::config::Config;
use agora::routes;
use agora::state::AppState;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

struct TestServer {
    base: String,
    client: reqwest::Client,
    _data_dir: TempDir,
}

// Helper to start the API against a fresh data directory
async fn start_server() -> TestServer {
    let data_dir = TempDir::new().unwrap();

    let mut config = Config::default();
    config.auth.secret = Some("e2e-secret".to_string());
    config.auth.bcrypt_cost = 4;
    config.resolve_paths(data_dir.path());

    let state = AppState::open(config, data_dir.path()).expect("Failed to open state");
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        _data_dir: data_dir,
    }
}

fn png_part(name: &str) -> Part {
    Part::bytes(vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3])
        .file_name(name.to_string())
        .mime_str("image/png")
        .unwrap()
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn register_form(&self, form: Form) -> reqwest::Response {
        self.client
            .post(self.url("/identity"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    async fn register(&self, username: &str, password: &str) {
        let form = Form::new()
            .text("username", username.to_string())
            .text("password", password.to_string())
            .text("email", format!("{}@example.com", username))
            .text("name", "Test")
            .text("surname", "User");
        let res = self.register_form(form).await;
        assert_eq!(res.status(), StatusCode::OK, "register {}", username);
    }

    /// Log in and return `(token, user id)`.
    async fn login(&self, username: &str, password: &str) -> (String, String) {
        let res = self
            .client
            .post(self.url("/identity/session"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        (
            body["token"].as_str().unwrap().to_string(),
            body["id"].as_str().unwrap().to_string(),
        )
    }

    async fn create_post(&self, token: &str, title: &str, text: &str) -> Value {
        let form = Form::new()
            .text("title", title.to_string())
            .text("postText", text.to_string());
        let res = self
            .client
            .post(self.url("/posts"))
            .header("accessToken", token)
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        res.json().await.unwrap()
    }

    async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        token: &str,
        body: Value,
    ) -> (StatusCode, Value) {
        let res = self
            .client
            .request(method, self.url(path))
            .header("accessToken", token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn toggle_like(&self, token: &str, post_id: &str) -> Value {
        let (status, body) = self
            .send_json(
                reqwest::Method::POST,
                "/likes",
                token,
                json!({ "postId": post_id }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }
}

#[tokio::test]
async fn like_toggle_and_ownership_scenario() {
    let server = start_server().await;
    server.register("alice", "secret1").await;
    server.register("bob", "secret2").await;

    let (alice_token, alice_id) = server.login("alice", "secret1").await;
    let post = server.create_post(&alice_token, "Hello", "World").await;
    let post_id = post["id"].as_str().unwrap().to_string();
    assert_eq!(post["user"]["id"], alice_id.as_str());
    assert!(post.get("userId").is_none());
    assert_eq!(post["postText"], "World");

    let (bob_token, _) = server.login("bob", "secret2").await;

    let outcome = server.toggle_like(&bob_token, &post_id).await;
    assert_eq!(outcome["liked"], true);
    let (_, fetched) = server.get_json(&format!("/posts/{}", post_id)).await;
    assert_eq!(fetched["likes"].as_array().unwrap().len(), 1);
    assert_eq!(fetched["likeCount"], 1);

    let outcome = server.toggle_like(&bob_token, &post_id).await;
    assert_eq!(outcome["liked"], false);
    let (_, fetched) = server.get_json(&format!("/posts/{}", post_id)).await;
    assert_eq!(fetched["likes"].as_array().unwrap().len(), 0);

    let title_path = format!("/posts/{}/title", post_id);
    let (status, body) = server
        .send_json(
            reqwest::Method::PUT,
            &title_path,
            &bob_token,
            json!({ "title": "Hacked" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    let (status, _) = server
        .send_json(
            reqwest::Method::PUT,
            &title_path,
            &alice_token,
            json!({ "title": "Hacked" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, fetched) = server.get_json(&format!("/posts/{}", post_id)).await;
    assert_eq!(fetched["title"], "Hacked");
}

#[tokio::test]
async fn non_owner_cannot_edit_or_delete_post() {
    let server = start_server().await;
    server.register("alice", "secret1").await;
    server.register("bob", "secret2").await;
    let (alice_token, _) = server.login("alice", "secret1").await;
    let (bob_token, _) = server.login("bob", "secret2").await;

    let post = server.create_post(&alice_token, "Hello", "World").await;
    let post_id = post["id"].as_str().unwrap();

    let (status, _) = server
        .send_json(
            reqwest::Method::PUT,
            &format!("/posts/{}/body", post_id),
            &bob_token,
            json!({ "postText": "mine now" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let res = server
        .client
        .delete(server.url(&format!("/posts/{}/photo", post_id)))
        .header("accessToken", &bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server
        .client
        .delete(server.url(&format!("/posts/{}", post_id)))
        .header("accessToken", &bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let (status, body) = server
        .send_json(
            reqwest::Method::PUT,
            &format!("/posts/{}/body", post_id),
            &alice_token,
            json!({ "postText": "Everyone" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["postText"], "Everyone");
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let server = start_server().await;
    server.register("alice", "secret1").await;

    let form = Form::new()
        .text("username", "alice")
        .text("password", "other")
        .text("email", "different@example.com")
        .text("name", "A")
        .text("surname", "B");
    let res = server.register_form(form).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["kind"], "duplicate_identity");

    let form = Form::new()
        .text("username", "alicia")
        .text("password", "other")
        .text("email", "alice@example.com")
        .text("name", "A")
        .text("surname", "B");
    let res = server.register_form(form).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let (_, results) = server.get_json("/identity?search=ali").await;
    assert_eq!(results.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn login_failures_and_missing_session() {
    let server = start_server().await;
    server.register("alice", "secret1").await;

    let res = server
        .client
        .post(server.url("/identity/session"))
        .json(&json!({ "username": "alice", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Wrong username and password combination.");

    let res = server
        .client
        .get(server.url("/identity/session"))
        .header("accessToken", "not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let (token, id) = server.login("alice", "secret1").await;
    let res = server
        .client
        .get(server.url("/identity/session"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["id"], id.as_str());
}

#[tokio::test]
async fn only_comment_author_can_delete() {
    let server = start_server().await;
    server.register("alice", "secret1").await;
    server.register("bob", "secret2").await;
    let (alice_token, _) = server.login("alice", "secret1").await;
    let (bob_token, _) = server.login("bob", "secret2").await;

    let post = server.create_post(&alice_token, "Hello", "World").await;
    let post_id = post["id"].as_str().unwrap();

    let (status, comment) = server
        .send_json(
            reqwest::Method::POST,
            "/comments",
            &bob_token,
            json!({ "postId": post_id, "commentBody": "Nice post" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(comment["username"], "bob");
    let comment_id = comment["id"].as_str().unwrap();

    let res = server
        .client
        .delete(server.url(&format!("/comments/{}", comment_id)))
        .header("accessToken", &alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server
        .client
        .delete(server.url(&format!("/comments/{}", comment_id)))
        .header("accessToken", &bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (_, comments) = server
        .get_json(&format!("/posts/{}/comments", post_id))
        .await;
    assert_eq!(comments, json!([]));
}

#[tokio::test]
async fn deleting_post_and_account_cascades() {
    let server = start_server().await;
    server.register("alice", "secret1").await;
    server.register("bob", "secret2").await;
    let (alice_token, alice_id) = server.login("alice", "secret1").await;
    let (bob_token, _) = server.login("bob", "secret2").await;

    let first = server.create_post(&alice_token, "First", "one").await;
    let second = server.create_post(&alice_token, "Second", "two").await;
    let bobs = server.create_post(&bob_token, "Bob's", "three").await;
    let first_id = first["id"].as_str().unwrap();
    let second_id = second["id"].as_str().unwrap();
    let bobs_id = bobs["id"].as_str().unwrap();

    for post_id in [first_id, second_id] {
        server
            .send_json(
                reqwest::Method::POST,
                "/comments",
                &bob_token,
                json!({ "postId": post_id, "commentBody": "hi" }),
            )
            .await;
        server.toggle_like(&bob_token, post_id).await;
    }
    server.toggle_like(&alice_token, bobs_id).await;

    let res = server
        .client
        .delete(server.url(&format!("/posts/{}", first_id)))
        .header("accessToken", &alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let (status, _) = server.get_json(&format!("/posts/{}", first_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server
        .get_json(&format!("/posts/{}/comments", first_id))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .send_json(
            reqwest::Method::DELETE,
            "/identity/profile",
            &alice_token,
            json!({ "password": "secret1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server.get_json(&format!("/posts/{}", second_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.get_json(&format!("/identity/{}", alice_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, bobs_post) = server.get_json(&format!("/posts/{}", bobs_id)).await;
    assert_eq!(bobs_post["likeCount"], 0);

    let (_, feed) = server.get_json("/posts").await;
    assert_eq!(feed["posts"].as_array().unwrap().len(), 1);

    // the deleted account's token no longer resolves
    let res = server
        .client
        .get(server.url("/identity/session"))
        .header("accessToken", &alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn search_scenario() {
    let server = start_server().await;
    server.register("alice", "secret1").await;
    server.register("bob", "secret2").await;

    let (status, results) = server.get_json("/identity?search=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results, json!([]));

    let (_, results) = server.get_json("/identity?search=ali").await;
    let names: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alice"]);

    for i in 0..11 {
        server.register(&format!("alfred{:02}", i), "pw").await;
    }
    let (_, results) = server.get_json("/identity?search=al").await;
    assert_eq!(results.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn feed_reports_viewer_likes() {
    let server = start_server().await;
    server.register("alice", "secret1").await;
    server.register("bob", "secret2").await;
    let (alice_token, _) = server.login("alice", "secret1").await;
    let (bob_token, _) = server.login("bob", "secret2").await;

    let liked = server.create_post(&alice_token, "Liked", "x").await;
    server.create_post(&alice_token, "Not liked", "y").await;
    let liked_id = liked["id"].as_str().unwrap();
    server.toggle_like(&bob_token, liked_id).await;

    let res = server
        .client
        .get(server.url("/posts"))
        .header("accessToken", &bob_token)
        .send()
        .await
        .unwrap();
    let feed: Value = res.json().await.unwrap();
    assert_eq!(feed["likedPostIds"], json!([liked_id]));
    assert_eq!(feed["posts"].as_array().unwrap().len(), 2);

    let (_, anonymous) = server.get_json("/posts").await;
    assert_eq!(anonymous["likedPostIds"], json!([]));
}

#[tokio::test]
async fn profile_photo_upload_replace_and_delete() {
    let server = start_server().await;
    let form = Form::new()
        .text("username", "alice")
        .text("password", "secret1")
        .text("email", "alice@example.com")
        .text("name", "Alice")
        .text("surname", "Liddell")
        .text("dateOfBirth", "1990-05-04")
        .part("photo", png_part("me.png"));
    assert_eq!(server.register_form(form).await.status(), StatusCode::OK);

    let (token, _) = server.login("alice", "secret1").await;
    let (_, profile) = {
        let res = server
            .client
            .get(server.url("/identity/profile"))
            .header("accessToken", &token)
            .send()
            .await
            .unwrap();
        (res.status(), res.json::<Value>().await.unwrap())
    };
    assert_eq!(profile["dateOfBirth"], "1990-05-04");
    let first_photo = profile["photo"].as_str().unwrap().to_string();

    let res = server
        .client
        .get(server.url(&format!("/uploads/{}", first_photo)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "image/png");

    let res = server
        .client
        .put(server.url("/identity/profile"))
        .header("accessToken", &token)
        .multipart(
            Form::new()
                .text("bio", "Down the rabbit hole")
                .part("photo", png_part("new.png")),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["bio"], "Down the rabbit hole");
    assert_ne!(body["user"]["photo"], first_photo.as_str());

    let res = server
        .client
        .get(server.url(&format!("/uploads/{}", first_photo)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    for _ in 0..2 {
        let res = server
            .client
            .delete(server.url("/identity/profile/photo"))
            .header("accessToken", &token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let server = start_server().await;
    let form = Form::new()
        .text("username", "alice")
        .text("password", "secret1")
        .text("email", "alice@example.com")
        .text("name", "Alice")
        .text("surname", "Liddell")
        .part(
            "photo",
            Part::bytes(b"#!/bin/sh".to_vec())
                .file_name("script.sh")
                .mime_str("text/x-sh")
                .unwrap(),
        );
    let res = server.register_form(form).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["kind"], "validation_error");

    let (_, results) = server.get_json("/identity?search=alice").await;
    assert_eq!(results, json!([]));
}

#[tokio::test]
async fn change_password_requires_old_password() {
    let server = start_server().await;
    server.register("alice", "secret1").await;
    let (token, _) = server.login("alice", "secret1").await;

    let (status, _) = server
        .send_json(
            reqwest::Method::PUT,
            "/identity/password",
            &token,
            json!({ "oldPassword": "nope", "newPassword": "secret9" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = server
        .send_json(
            reqwest::Method::PUT,
            "/identity/password",
            &token,
            json!({ "oldPassword": "secret1", "newPassword": "secret9" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    server.login("alice", "secret9").await;
}

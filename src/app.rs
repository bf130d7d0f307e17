use std::{net::SocketAddr, time::Duration};

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{auth, auth::BasicAuth, config::ServerConfig, posts, state::AppState, users};

/// Upper bound on the whole request, store and mail calls included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/v1",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .merge(posts::router())
                .route("/health", get(health)),
        )
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

async fn health(State(state): State<AppState>, _auth: BasicAuth) -> Json<Value> {
    Json(json!({
        "status": "available",
        "environment": state.config.server.environment,
        "version": state.config.server.version,
    }))
}

pub async fn serve(app: Router, server: &ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", server.host, server.port).parse()?;

    tracing::info!(%addr, env = %server.environment, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        auth::jwt::JwtKeys,
        state::fake::Fakes,
        store::User,
    };
    use axum::extract::FromRef;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            req = req.header(header::AUTHORIZATION, auth);
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn bearer(state: &AppState, user: &User) -> String {
        let keys = JwtKeys::from_ref(state);
        format!("Bearer {}", keys.generate_token(&keys.claims_for(user.id)).unwrap())
    }

    fn app() -> (Router, AppState, Fakes) {
        let (state, fakes) = AppState::fake();
        (build_app(state.clone()), state, fakes)
    }

    #[tokio::test]
    async fn register_then_duplicate_email() {
        let (app, _, _) = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/authentication/user",
            None,
            Some(json!({"username": "alice", "email": "alice@x.com", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["username"], "alice");
        assert_eq!(body["is_active"], false);
        assert!(!body["token"].as_str().unwrap().is_empty());
        assert!(body.get("password_hash").is_none());

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/authentication/user",
            None,
            Some(json!({"username": "alice2", "email": "alice@x.com", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "duplicate email");
    }

    #[tokio::test]
    async fn invalid_registration_is_rejected_before_persisting() {
        let (app, _, fakes) = app();

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/authentication/user",
            None,
            Some(json!({"username": "alice", "email": "nope", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(fakes.store.invitation_count(), 0);
        assert!(fakes.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn mail_failure_returns_500_and_user_is_gone() {
        let (app, _, fakes) = app();
        fakes.mailer.fail(true);

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/authentication/user",
            None,
            Some(json!({"username": "alice", "email": "alice@x.com", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
        assert_eq!(fakes.store.invitation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_mail_server_fails_before_request_timeout() {
        let (app, _, fakes) = app();
        fakes.mailer.delay(Duration::from_secs(61));

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/authentication/user",
            None,
            Some(json!({"username": "alice", "email": "alice@x.com", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fakes.store.invitation_count(), 0);
        assert!(fakes.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn activate_then_login_then_fetch_self() {
        let (app, _, fakes) = app();

        let (_, created) = send(
            &app,
            Method::POST,
            "/v1/authentication/user",
            None,
            Some(json!({"username": "alice", "email": "alice@x.com", "password": "secret1"})),
        )
        .await;
        let token = created["token"].as_str().unwrap().to_string();
        let id = created["id"].as_i64().unwrap();

        let uri = format!("/v1/users/activate/{token}");
        let (status, _) = send(&app, Method::PUT, &uri, None, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::PUT, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/authentication/token",
            None,
            Some(json!({"email": "alice@x.com", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let jwt = format!("Bearer {}", body["token"].as_str().unwrap());

        let (status, body) = send(&app, Method::GET, &format!("/v1/users/{id}"), Some(&jwt), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_active"], true);
        assert!(fakes.cache.contains(id));
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_bearer() {
        let (app, _, _) = app();
        let (status, _) = send(&app, Method::GET, "/v1/feed", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Method::GET, "/v1/feed", Some("Bearer garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let (app, state, fakes) = app();
        let bob = fakes.store.seed_user("bob", "user");
        let (status, body) =
            send(&app, Method::GET, "/v1/users/9999", Some(&bearer(&state, &bob)), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "resource not found");
    }

    #[tokio::test]
    async fn post_lifecycle_respects_ownership_and_roles() {
        let (app, state, fakes) = app();
        let bob = fakes.store.seed_user("bob", "user");
        let eve = fakes.store.seed_user("eve", "user");
        let moderator = fakes.store.seed_user("mod", "moderator");
        let admin = fakes.store.seed_user("root", "admin");

        let (status, post) = send(
            &app,
            Method::POST,
            "/v1/posts",
            Some(&bearer(&state, &bob)),
            Some(json!({"title": "hello", "content": "first post", "tags": ["rust"]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/v1/posts/{}", post["id"]);

        let patch = Some(json!({"title": "edited"}));
        let (status, _) =
            send(&app, Method::PATCH, &uri, Some(&bearer(&state, &eve)), patch.clone()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) =
            send(&app, Method::PATCH, &uri, Some(&bearer(&state, &moderator)), patch).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "edited");
        assert_eq!(body["content"], "first post");

        let (status, comment) = send(
            &app,
            Method::POST,
            &format!("{uri}/comments"),
            Some(&bearer(&state, &eve)),
            Some(json!({"content": "nice one"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(comment["username"], "eve");

        let (status, body) = send(&app, Method::GET, &uri, Some(&bearer(&state, &eve)), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["comments"].as_array().unwrap().len(), 1);

        let (status, _) =
            send(&app, Method::DELETE, &uri, Some(&bearer(&state, &moderator)), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, Method::DELETE, &uri, Some(&bearer(&state, &admin)), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, Some(&bearer(&state, &bob)), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn follow_rules_and_feed() {
        let (app, state, fakes) = app();
        let bob = fakes.store.seed_user("bob", "user");
        let eve = fakes.store.seed_user("eve", "user");
        let bob_auth = bearer(&state, &bob);

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/posts",
            Some(&bearer(&state, &eve)),
            Some(json!({"title": "eve here", "content": "hello all", "tags": ["go", "rust"]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, feed) = send(&app, Method::GET, "/v1/feed", Some(&bob_auth), None).await;
        assert!(feed.as_array().unwrap().is_empty());

        let follow = format!("/v1/users/{}/follow", eve.id);
        let (status, _) = send(&app, Method::PUT, &follow, Some(&bob_auth), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::PUT, &follow, Some(&bob_auth), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let own = format!("/v1/users/{}/follow", bob.id);
        let (status, _) = send(&app, Method::PUT, &own, Some(&bob_auth), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, Method::PUT, "/v1/users/9999/follow", Some(&bob_auth), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, feed) =
            send(&app, Method::GET, "/v1/feed?tags=rust&limit=5", Some(&bob_auth), None).await;
        assert_eq!(status, StatusCode::OK);
        let items = feed.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["username"], "eve");

        let (status, _) = send(&app, Method::GET, "/v1/feed?limit=50", Some(&bob_auth), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unfollow = format!("/v1/users/{}/unfollow", eve.id);
        let (status, _) = send(&app, Method::PUT, &unfollow, Some(&bob_auth), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, feed) = send(&app, Method::GET, "/v1/feed", Some(&bob_auth), None).await;
        assert!(feed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_requires_basic_auth() {
        let (app, _, _) = app();
        let (status, _) = send(&app, Method::GET, "/v1/health", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let auth = format!("Basic {}", STANDARD.encode("admin:admin-pw"));
        let (status, body) = send(&app, Method::GET, "/v1/health", Some(&auth), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "available");
        assert_eq!(body["environment"], "test");
    }
}

//! E2E tests: refresh, logout and origin checks.

use actix_web::{http::header, test};
use serde_json::{Value, json};

use super::test_helpers::*;

const UNUSED_SUAP: &str = "http://127.0.0.1:9";

fn rotating_context() -> TestContext {
    let mut config = test_config(UNUSED_SUAP);
    config.jwt.rotate_refresh_tokens = true;
    config.jwt.blacklist_after_rotation = true;
    TestContext::with_config(config)
}

async fn post_json<S>(app: &S, uri: &str, token: Option<&str>, body: Value) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = AppResponse,
            Error = actix_web::Error,
        >,
{
    let mut req = test::TestRequest::post().uri(uri).set_json(body);
    if let Some(token) = token {
        req = req.insert_header((header::AUTHORIZATION, format!("Bearer {}", token)));
    }
    let resp = test::call_service(app, req.to_request()).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

#[actix_rt::test]
async fn test_refresh_without_rotation() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let organizer = ctx.organizer().await;
    let app = init_app(ctx.state()).await;
    let tokens = login_tokens(&app, &organizer.matricula, ORGANIZER_PASSWORD).await;

    let (status, body) = post_json(
        &app,
        "/api/v1/auth/token/refresh",
        None,
        json!({ "refresh": tokens.refresh }),
    )
    .await;

    assert_eq!(status, 200, "refresh failed: {}", body);
    assert!(body["access"].is_string());
    assert!(body.get("refresh").is_none());

    // Same refresh token keeps working while rotation is off
    let (status, _) = post_json(
        &app,
        "/api/v1/auth/token/refresh",
        None,
        json!({ "refresh": tokens.refresh }),
    )
    .await;
    assert_eq!(status, 200);
}

#[actix_rt::test]
async fn test_refresh_rejects_access_token_and_garbage() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let organizer = ctx.organizer().await;
    let app = init_app(ctx.state()).await;
    let tokens = login_tokens(&app, &organizer.matricula, ORGANIZER_PASSWORD).await;

    let (status, _) = post_json(
        &app,
        "/api/v1/auth/token/refresh",
        None,
        json!({ "refresh": tokens.access }),
    )
    .await;
    assert_eq!(status, 401);

    let (status, _) = post_json(
        &app,
        "/api/v1/auth/token/refresh",
        None,
        json!({ "refresh": "not-a-jwt" }),
    )
    .await;
    assert_eq!(status, 401);
}

#[actix_rt::test]
async fn test_rotation_blacklists_previous_refresh_token() {
    let ctx = rotating_context();
    let organizer = ctx.organizer().await;
    let app = init_app(ctx.state()).await;
    let tokens = login_tokens(&app, &organizer.matricula, ORGANIZER_PASSWORD).await;

    let (status, body) = post_json(
        &app,
        "/api/v1/auth/token/refresh",
        None,
        json!({ "refresh": tokens.refresh }),
    )
    .await;
    assert_eq!(status, 200);
    let rotated = body["refresh"].as_str().expect("rotated refresh token").to_string();
    assert_ne!(rotated, tokens.refresh);

    let (status, _) = post_json(
        &app,
        "/api/v1/auth/token/refresh",
        None,
        json!({ "refresh": tokens.refresh }),
    )
    .await;
    assert_eq!(status, 401, "Rotated-out refresh token must be rejected");

    let (status, _) = post_json(
        &app,
        "/api/v1/auth/token/refresh",
        None,
        json!({ "refresh": rotated }),
    )
    .await;
    assert_eq!(status, 200);
}

#[actix_rt::test]
async fn test_refresh_for_disabled_user_rejected() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let organizer = ctx.organizer().await;
    let app = init_app(ctx.state()).await;
    let tokens = login_tokens(&app, &organizer.matricula, ORGANIZER_PASSWORD).await;
    ctx.store.set_active(organizer.id, false).await.unwrap();

    let (status, _) = post_json(
        &app,
        "/api/v1/auth/token/refresh",
        None,
        json!({ "refresh": tokens.refresh }),
    )
    .await;
    assert_eq!(status, 401);
}

#[actix_rt::test]
async fn test_logout_requires_access_token() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let app = init_app(ctx.state()).await;

    let (status, body) = post_json(&app, "/api/v1/auth/logout", None, json!({})).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[actix_rt::test]
async fn test_logout_emits_event() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let organizer = ctx.organizer().await;
    let app = init_app(ctx.state()).await;
    let tokens = login_tokens(&app, &organizer.matricula, ORGANIZER_PASSWORD).await;

    let (status, body) = post_json(
        &app,
        "/api/v1/auth/logout",
        Some(&tokens.access),
        json!({ "refresh": tokens.refresh }),
    )
    .await;

    assert_eq!(status, 200);
    // Nothing to revoke while rotation is off
    assert_eq!(body["refresh_revoked"], false);

    let events = ctx.wait_for_events(2).await;
    let logout = events
        .iter()
        .find(|e| e.routing_key == "auth.logout")
        .expect("logout event");
    assert_eq!(logout.event["operation_type"], "LOGOUT");
    assert_eq!(logout.event["entity_id"], organizer.id.to_string());
}

#[actix_rt::test]
async fn test_logout_revokes_refresh_token_when_blacklisting() {
    let ctx = rotating_context();
    let organizer = ctx.organizer().await;
    let app = init_app(ctx.state()).await;
    let tokens = login_tokens(&app, &organizer.matricula, ORGANIZER_PASSWORD).await;

    let (status, body) = post_json(
        &app,
        "/api/v1/auth/logout",
        Some(&tokens.access),
        json!({ "refresh": tokens.refresh }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["refresh_revoked"], true);

    let (status, _) = post_json(
        &app,
        "/api/v1/auth/token/refresh",
        None,
        json!({ "refresh": tokens.refresh }),
    )
    .await;
    assert_eq!(status, 401);
}

#[actix_rt::test]
async fn test_logout_cannot_revoke_someone_elses_token() {
    let ctx = rotating_context();
    let organizer = ctx.organizer().await;
    let password = secrecy::SecretString::from("other-password");
    let (other, _) = ifsports_auth_lib::services::provisioning::provision_organizer(
        ctx.store.as_ref(),
        "sgp",
        "",
        &password,
    )
    .await
    .unwrap();
    let app = init_app(ctx.state()).await;

    let mine = login_tokens(&app, &organizer.matricula, ORGANIZER_PASSWORD).await;
    let theirs = login_tokens(&app, &other.matricula, "other-password").await;

    let (status, _) = post_json(
        &app,
        "/api/v1/auth/logout",
        Some(&mine.access),
        json!({ "refresh": theirs.refresh }),
    )
    .await;
    assert_eq!(status, 403);

    let (status, _) = post_json(
        &app,
        "/api/v1/auth/token/refresh",
        None,
        json!({ "refresh": theirs.refresh }),
    )
    .await;
    assert_eq!(status, 200, "Foreign token must stay usable");
}

#[actix_rt::test]
async fn test_untrusted_origin_rejected() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let organizer = ctx.organizer().await;
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/token")
        .insert_header((header::ORIGIN, "https://evil.example.com"))
        .set_json(json!({ "matricula": organizer.matricula, "password": ORGANIZER_PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/token")
        .insert_header((header::ORIGIN, FRONTEND_URL))
        .set_json(json!({ "matricula": organizer.matricula, "password": ORGANIZER_PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
}

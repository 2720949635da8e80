//! E2E tests: user directory, health and API document.

use actix_web::{http::header, test};
use serde_json::{Value, json};

use super::test_helpers::*;

const UNUSED_SUAP: &str = "http://127.0.0.1:9";

async fn validate<S>(app: &S, token: &str, ids: Value) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = AppResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::post()
        .uri("/api/v1/users/validate")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .set_json(json!({ "user_ids": ids }))
        .to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

#[actix_rt::test]
async fn test_current_user_profile() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let organizer = ctx.organizer().await;
    let app = init_app(ctx.state()).await;
    let tokens = login_tokens(&app, &organizer.matricula, ORGANIZER_PASSWORD).await;

    let (status, body) = get_with_token(&app, "/api/v1/users/me", &tokens.access).await;

    assert_eq!(status, 200);
    assert_eq!(body["matricula"], "organizador_cnat");
    assert_eq!(body["nome"], "Organizador CNAT");
    assert_eq!(body["campus"], "CNAT");
    assert_eq!(body["groups"], json!(["Organizador"]));
    assert!(body.get("password").is_none());
}

#[actix_rt::test]
async fn test_user_lookup() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let organizer = ctx.organizer().await;
    ctx.sso_user("20231011110001").await;
    let app = init_app(ctx.state()).await;
    let tokens = login_tokens(&app, &organizer.matricula, ORGANIZER_PASSWORD).await;

    let (status, body) =
        get_with_token(&app, "/api/v1/users/20231011110001", &tokens.access).await;
    assert_eq!(status, 200);
    assert_eq!(body["nome"], "Aluno 20231011110001");

    let (status, body) = get_with_token(&app, "/api/v1/users/99999999", &tokens.access).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[actix_rt::test]
async fn test_directory_requires_token() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri("/api/v1/users/me").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);

    let (status, _) = get_with_token(&app, "/api/v1/users/me", "garbage").await;
    assert_eq!(status, 401);
}

#[actix_rt::test]
async fn test_validate_users() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let organizer = ctx.organizer().await;
    ctx.sso_user("A1").await;
    ctx.sso_user("B2").await;
    let app = init_app(ctx.state()).await;
    let token = login_tokens(&app, &organizer.matricula, ORGANIZER_PASSWORD)
        .await
        .access;

    let (status, body) = validate(&app, &token, json!(["A1", "B2"])).await;
    assert_eq!(status, 200);
    assert_eq!(body["all_exist"], true);
    assert_eq!(body["valid_ids"], json!(["A1", "B2"]));

    let (status, body) = validate(&app, &token, json!(["A1", "C3"])).await;
    assert_eq!(status, 400);
    assert_eq!(body["all_exist"], false);
    assert_eq!(body["valid_ids"], json!(["A1"]));
    assert_eq!(body["invalid_ids"], json!(["C3"]));

    let (status, body) = validate(&app, &token, json!([])).await;
    assert_eq!(status, 200);
    assert_eq!(body["all_exist"], true);
}

#[actix_rt::test]
async fn test_health_and_ready() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "auth-service");

    let req = test::TestRequest::get().uri("/api/v1/ready").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
}

#[actix_rt::test]
async fn test_openapi_document_lists_auth_paths() {
    let ctx = TestContext::new(UNUSED_SUAP);
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri("/api/v1/openapi.json").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);

    let body: Value = test::read_body_json(resp).await;
    let paths = body["paths"].as_object().expect("paths object");
    assert!(paths.contains_key("/api/v1/auth/token"));
    assert!(paths.contains_key("/api/v1/auth/login"));
    assert!(paths.contains_key("/api/v1/users/validate"));
}

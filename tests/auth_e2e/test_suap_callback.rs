//! E2E tests: SUAP OAuth2 callback.

use std::sync::Arc;

use actix_web::{http::StatusCode, test};

use ifsports_auth_lib::db::UserStore;
use ifsports_auth_lib::models::Role;
use ifsports_auth_lib::services::TokenIssuer;
use ifsports_auth_lib::services::audit::EVENTS_EXCHANGE;
use ifsports_auth_lib::state::AppState;

use super::mock_suap_provider::{MATRICULA, MockSuapProvider, VALID_CODE, eu_payload};
use super::test_helpers::*;

fn callback_uri(code: &str) -> String {
    format!("/api/v1/auth/login?code={}&state=xyz", code)
}

#[actix_rt::test]
async fn test_callback_creates_user_and_redirects_with_tokens() {
    let mock = MockSuapProvider::start().await;
    let ctx = TestContext::new(&mock.base_url);
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri(&callback_uri(VALID_CODE)).to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    let target = location(&resp);
    assert!(
        target.starts_with(&format!("{}/auth/handle-token?", FRONTEND_URL)),
        "unexpected redirect: {}",
        target
    );

    let params = query_params(&target);
    assert_eq!(params["user_created"], "true");
    assert_eq!(params["nome"], "Maria Souza da Silva");
    assert_eq!(params["email"], "maria@escolar.ifrn.edu.br");
    assert_eq!(
        params["foto"],
        "https://suap.example.edu/media/fotos/150x200/maria.jpg"
    );

    let issuer = TokenIssuer::new(&ctx.config.jwt);
    let claims = issuer.verify_access(&params["access"]).unwrap();
    assert_eq!(claims.matricula, MATRICULA);
    assert_eq!(claims.groups, vec!["Jogador".to_string()]);
    assert_eq!(claims.campus.as_deref(), Some("CNAT"));

    let user = ctx.store.find_by_matricula(MATRICULA).await.unwrap().unwrap();
    assert_eq!(user.groups, vec![Role::Jogador]);
    assert_eq!(user.curso.as_deref(), Some("Tecnologia em Sistemas para Internet"));
    assert_eq!(user.situacao.as_deref(), Some("Matriculado"));
    assert!(user.last_login_at.is_some());

    let events = ctx.wait_for_events(1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].exchange, EVENTS_EXCHANGE);
    assert_eq!(events[0].routing_key, "auth.login");
    assert_eq!(events[0].event["user_id"], MATRICULA);
    assert_eq!(events[0].event["operation_type"], "LOGIN");
    assert_eq!(events[0].event["new_data"]["method"], "suap");
    assert_eq!(events[0].event["new_data"]["user_created"], true);
}

#[actix_rt::test]
async fn test_token_exchange_sends_client_credentials() {
    let mock = MockSuapProvider::start().await;
    let ctx = TestContext::new(&mock.base_url);
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri(&callback_uri(VALID_CODE)).to_request();
    test::call_service(&app, req).await;

    let requests = mock.token_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["grant_type"], "authorization_code");
    assert_eq!(requests[0]["code"], VALID_CODE);
    assert_eq!(requests[0]["client_id"], "e2e-client");
    assert_eq!(requests[0]["client_secret"], "e2e-client-secret");
    assert_eq!(
        requests[0]["redirect_uri"],
        "http://localhost:8000/api/v1/auth/login"
    );
}

#[actix_rt::test]
async fn test_repeat_login_reuses_account() {
    let mock = MockSuapProvider::start().await;
    let ctx = TestContext::new(&mock.base_url);
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri(&callback_uri(VALID_CODE)).to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri(&callback_uri(VALID_CODE)).to_request();
    let resp = test::call_service(&app, req).await;
    let params = query_params(&location(&resp));

    assert_eq!(params["user_created"], "false");
    assert_eq!(ctx.store.len().await, 1);
}

#[actix_rt::test]
async fn test_organizer_keeps_role_after_sso_login() {
    let mock = MockSuapProvider::start().await;
    let ctx = TestContext::new(&mock.base_url);
    let existing = ctx.sso_user(MATRICULA).await;
    ctx.store.add_role(existing.id, Role::Organizador).await.unwrap();
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri(&callback_uri(VALID_CODE)).to_request();
    test::call_service(&app, req).await;

    let user = ctx.store.find_by_id(existing.id).await.unwrap().unwrap();
    assert_eq!(user.groups, vec![Role::Organizador]);
    assert_eq!(user.nome, "Maria Souza da Silva");
}

#[actix_rt::test]
async fn test_one_profile_endpoint_failing_still_logs_in() {
    let mock = MockSuapProvider::start().await;
    mock.set_eu(None);
    let ctx = TestContext::new(&mock.base_url);
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri(&callback_uri(VALID_CODE)).to_request();
    let resp = test::call_service(&app, req).await;
    let params = query_params(&location(&resp));

    assert!(params.contains_key("access"), "expected tokens: {:?}", params);
    assert_eq!(params["nome"], "Maria Souza da Silva");
    // Without /api/eu the email comes from meus-dados
    assert_eq!(params["email"], "maria.souza@gmail.com");
}

#[actix_rt::test]
async fn test_both_profile_endpoints_failing() {
    let mock = MockSuapProvider::start().await;
    mock.set_eu(None);
    mock.set_my_data(None);
    let ctx = TestContext::new(&mock.base_url);
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri(&callback_uri(VALID_CODE)).to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    let target = location(&resp);
    assert!(target.starts_with(&format!("{}/?", FRONTEND_URL)));
    assert_eq!(query_params(&target)["error"], "suap_profile_unavailable");
    assert!(ctx.store.is_empty().await);
}

#[actix_rt::test]
async fn test_profile_without_matricula() {
    let mock = MockSuapProvider::start().await;
    let mut eu = eu_payload();
    eu.as_object_mut().unwrap().remove("identificacao");
    mock.set_eu(Some(eu));
    mock.set_my_data(None);
    let ctx = TestContext::new(&mock.base_url);
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri(&callback_uri(VALID_CODE)).to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(query_params(&location(&resp))["error"], "incomplete_identity");
    assert!(ctx.store.is_empty().await);
    assert!(ctx.transport.events().is_empty());
}

#[actix_rt::test]
async fn test_token_exchange_failures() {
    let mock = MockSuapProvider::start().await;
    let ctx = TestContext::new(&mock.base_url);
    let app = init_app(ctx.state()).await;

    // Code rejected by SUAP
    let req = test::TestRequest::get().uri(&callback_uri("stale-code")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(query_params(&location(&resp))["error"], "suap_exchange_failed");

    // SUAP itself failing
    mock.set_token_status(503);
    let req = test::TestRequest::get().uri(&callback_uri(VALID_CODE)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(query_params(&location(&resp))["error"], "suap_exchange_failed");

    assert!(ctx.store.is_empty().await);
}

#[actix_rt::test]
async fn test_callback_without_code_or_with_provider_error() {
    let mock = MockSuapProvider::start().await;
    let ctx = TestContext::new(&mock.base_url);
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri("/api/v1/auth/login").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(query_params(&location(&resp))["error"], "missing_code");

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/login?error=access_denied&state=xyz")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(query_params(&location(&resp))["error"], "access_denied");

    assert!(mock.token_requests().is_empty());
}

#[actix_rt::test]
async fn test_broker_outage_does_not_block_login() {
    let mock = MockSuapProvider::start().await;
    let ctx = TestContext::new(&mock.base_url);
    let state = AppState::new(
        ctx.config.clone(),
        ctx.store.clone(),
        ctx.store.clone(),
        Arc::new(DownTransport),
    )
    .unwrap();
    let app = init_app(state).await;

    let req = test::TestRequest::get().uri(&callback_uri(VALID_CODE)).to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(query_params(&location(&resp)).contains_key("access"));
    assert_eq!(ctx.store.len().await, 1);
}

#[actix_rt::test]
async fn test_authorize_redirects_to_suap() {
    let mock = MockSuapProvider::start().await;
    let ctx = TestContext::new(&mock.base_url);
    let app = init_app(ctx.state()).await;

    let req = test::TestRequest::get().uri("/api/v1/auth/suap").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    let target = location(&resp);
    assert!(target.starts_with(&format!("{}/o/authorize/", mock.base_url)));

    let params = query_params(&target);
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["client_id"], "e2e-client");
    assert_eq!(params["scope"], "identificacao email dados_pessoais");
    assert_eq!(params["redirect_uri"], "http://localhost:8000/api/v1/auth/login");
}

//! Mock SUAP provider for E2E tests.
//!
//! Serves the token endpoint and both profile endpoints from an in-process
//! HTTP server. Each endpoint can be switched to fail per test.

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use actix_web::{App, HttpRequest, HttpResponse, HttpServer, get, post, web};
use serde_json::{Value, json};

/// Authorization code the mock accepts.
pub const VALID_CODE: &str = "valid-code";
/// Access token the mock hands out and expects back.
pub const MOCK_ACCESS_TOKEN: &str = "mock-suap-access-token";
pub const MATRICULA: &str = "20231011110001";

/// Payload returned by `/api/eu`.
pub fn eu_payload() -> Value {
    json!({
        "identificacao": MATRICULA,
        "nome_usual": "Maria Souza",
        "email": "maria@escolar.ifrn.edu.br",
        "campus": "CNAT",
        "foto": "/media/fotos/75x100/maria.jpg",
        "sexo": "F",
        "tipo_usuario": "Aluno",
        "data_de_nascimento": "2004-05-17"
    })
}

/// Payload returned by `/api/rh/meus-dados`.
pub fn my_data_payload() -> Value {
    json!({
        "matricula": MATRICULA,
        "nome_usual": "Maria Souza",
        "email": "maria.souza@gmail.com",
        "url_foto_150x200": "https://suap.example.edu/media/fotos/150x200/maria.jpg",
        "tipo_vinculo": "Aluno",
        "sexo": "F",
        "data_nascimento": "2004-05-17",
        "vinculo": {
            "nome": "Maria Souza da Silva",
            "campus": "CNAT",
            "curso": "Tecnologia em Sistemas para Internet",
            "situacao": "Matriculado"
        }
    })
}

/// Shared, mutable behavior of the mock.
pub struct MockSuapState {
    /// Status of the token endpoint when the code is valid.
    pub token_status: u16,
    /// `None` makes the endpoint answer 500.
    pub eu: Option<Value>,
    pub my_data: Option<Value>,
    /// Form bodies received by the token endpoint.
    pub token_requests: Vec<HashMap<String, String>>,
}

impl Default for MockSuapState {
    fn default() -> Self {
        Self {
            token_status: 200,
            eu: Some(eu_payload()),
            my_data: Some(my_data_payload()),
            token_requests: Vec::new(),
        }
    }
}

type SharedState = web::Data<Arc<Mutex<MockSuapState>>>;

fn authorized(req: &HttpRequest) -> bool {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", MOCK_ACCESS_TOKEN))
        .unwrap_or(false)
}

#[post("/o/token/")]
async fn token_endpoint(
    form: web::Form<HashMap<String, String>>,
    state: SharedState,
) -> HttpResponse {
    let mut state = state.lock().unwrap();
    let form = form.into_inner();
    let code_ok = form.get("code").map(String::as_str) == Some(VALID_CODE);
    state.token_requests.push(form);

    if !code_ok {
        return HttpResponse::BadRequest().json(json!({ "error": "invalid_grant" }));
    }
    if state.token_status != 200 {
        return HttpResponse::build(
            actix_web::http::StatusCode::from_u16(state.token_status).unwrap(),
        )
        .json(json!({ "error": "server_error" }));
    }

    HttpResponse::Ok().json(json!({
        "access_token": MOCK_ACCESS_TOKEN,
        "token_type": "Bearer",
        "expires_in": 36000,
        "scope": "identificacao email dados_pessoais"
    }))
}

fn profile_response(req: &HttpRequest, payload: Option<Value>) -> HttpResponse {
    if !authorized(req) {
        return HttpResponse::Unauthorized().json(json!({ "detail": "invalid token" }));
    }
    match payload {
        Some(body) => HttpResponse::Ok().json(body),
        None => HttpResponse::InternalServerError().finish(),
    }
}

#[get("/api/eu")]
async fn eu_endpoint(req: HttpRequest, state: SharedState) -> HttpResponse {
    let payload = state.lock().unwrap().eu.clone();
    profile_response(&req, payload)
}

#[get("/api/rh/meus-dados")]
async fn my_data_endpoint(req: HttpRequest, state: SharedState) -> HttpResponse {
    let payload = state.lock().unwrap().my_data.clone();
    profile_response(&req, payload)
}

/// Mock SUAP deployment.
pub struct MockSuapProvider {
    pub base_url: String,
    pub state: Arc<Mutex<MockSuapState>>,
}

impl MockSuapProvider {
    /// Start the mock on an ephemeral port.
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(MockSuapState::default()));

        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        let port = listener.local_addr().unwrap().port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state_data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state_data.clone()))
                .service(token_endpoint)
                .service(eu_endpoint)
                .service(my_data_endpoint)
        })
        .workers(1)
        .listen(listener)
        .expect("failed to listen")
        .disable_signals()
        .run();

        // Lives until the test runtime shuts down
        tokio::spawn(server);

        MockSuapProvider { base_url, state }
    }

    pub fn set_token_status(&self, status: u16) {
        self.state.lock().unwrap().token_status = status;
    }

    pub fn set_eu(&self, payload: Option<Value>) {
        self.state.lock().unwrap().eu = payload;
    }

    pub fn set_my_data(&self, payload: Option<Value>) {
        self.state.lock().unwrap().my_data = payload;
    }

    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.state.lock().unwrap().token_requests.clone()
    }
}

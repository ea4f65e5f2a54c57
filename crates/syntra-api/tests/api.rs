use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use syntra_api::auth::{AppState, AppStateInner};
use syntra_api::notifications::{MemoryInbox, Notifier};
use syntra_api::report_store::ReportStore;
use syntra_chat::{ChatResponder, MemorySessionStore};
use syntra_db::Database;
use syntra_gateway::Dispatcher;
use syntra_storage::BlobStore;

struct TestApp {
    _tmp: tempfile::TempDir,
    router: Router,
}

async fn app() -> TestApp {
    let tmp = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory().unwrap());
    let blobs = Arc::new(BlobStore::new(tmp.path().join("blobs")).await.unwrap());
    let dispatcher = Dispatcher::new();

    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        reports: ReportStore::new(db, blobs, "http://localhost:3000"),
        jwt_secret: "test-secret".into(),
        dispatcher: dispatcher.clone(),
        chat: ChatResponder::new(Arc::new(MemorySessionStore::new()), None),
        notifier: Notifier::new(Arc::new(MemoryInbox::new()), None, dispatcher),
        geocoder: None,
    });

    TestApp {
        _tmp: tmp,
        router: syntra_api::router(state),
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn citizen(&self, email: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({"email": email, "username": "Ana", "password": "secreto1"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    async fn agent(&self, email: &str) -> String {
        let (status, _) = self
            .call(
                Method::POST,
                "/auth/register-agent",
                None,
                Some(json!({
                    "email": email,
                    "password": "secreto1",
                    "document": "1020304050",
                    "plate": "abc123"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .call(
                Method::POST,
                "/auth/login-agent",
                None,
                Some(json!({"email": email, "password": "secreto1"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "agent");
        body["token"].as_str().unwrap().to_string()
    }

    async fn report(&self, token: &str, status: &str) -> String {
        let (code, body) = self
            .call(
                Method::POST,
                "/reports",
                Some(token),
                Some(json!({
                    "address": "Av. Boyacá con Calle 80",
                    "description": "Luz roja fundida",
                    "status": status,
                    "lat": 4.69,
                    "lng": -74.1
                })),
            )
            .await;
        assert_eq!(code, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn register_login_and_profile() {
    let app = app().await;
    app.citizen("ana@syntra.co").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "ANA@syntra.co", "password": "secreto1"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "citizen");
    let token = body["token"].as_str().unwrap();

    let (status, me) = app.call(Method::GET, "/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ana@syntra.co");
    assert_eq!(me["username"], "Ana");
    assert!(me.get("plate").is_none());

    let (status, _) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "ana@syntra.co", "password": "incorrecta"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_rules() {
    let app = app().await;
    app.citizen("ana@syntra.co").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"email": "ana@syntra.co", "username": "Otra", "password": "secreto1"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _) = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"email": "bea@syntra.co", "username": "Bea", "password": "123"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn citizen_cannot_use_agent_login() {
    let app = app().await;
    app.citizen("ana@syntra.co").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/login-agent",
            None,
            Some(json!({"email": "ana@syntra.co", "password": "secreto1"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Tu cuenta no está habilitada como agente");
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = app().await;
    let (status, body) = app.call(Method::GET, "/reports/mine", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = app
        .call(Method::GET, "/reports/mine", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn report_lifecycle() {
    let app = app().await;
    let citizen = app.citizen("ana@syntra.co").await;
    let agent = app.agent("agente@transito.gov.co").await;

    let id = app.report(&citizen, "Falla crítico").await;

    let (_, mine) = app.call(Method::GET, "/reports/mine", Some(&citizen), None).await;
    let reports = mine["reports"].as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["id"], id.as_str());
    assert_eq!(reports[0]["status"], "falla_critica");
    assert_eq!(reports[0]["status_label"], "Falla crítico");

    let (_, map) = app.call(Method::GET, "/reports/map", Some(&agent), None).await;
    assert_eq!(map["reports"].as_array().unwrap().len(), 1);

    // Citizens cannot change status, see stats, or delete
    let uri = format!("/reports/{}/status", id);
    let (status, _) = app
        .call(Method::PATCH, &uri, Some(&citizen), Some(json!({"status": "Operativo"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::GET, "/reports/stats", Some(&citizen), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(Method::PATCH, &uri, Some(&agent), Some(json!({"status": "Operativo"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "operativo");
    assert_eq!(body["status_label"], "Operativo");

    let (status, stats) = app.call(Method::GET, "/reports/stats", Some(&agent), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["fixed"], 1);
    assert_eq!(stats["fixed_percent"], 100);

    // The reporter heard about both events
    let (_, inbox) = app.call(Method::GET, "/notifications", Some(&citizen), None).await;
    let titles: Vec<&str> = inbox
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Nuevo reporte", "Estado de reporte actualizado"]);

    let report_uri = format!("/reports/{}", id);
    let (status, _) = app.call(Method::DELETE, &report_uri, Some(&citizen), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::DELETE, &report_uri, Some(&agent), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = app.call(Method::GET, &report_uri, Some(&agent), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn blank_report_is_rejected() {
    let app = app().await;
    let citizen = app.citizen("ana@syntra.co").await;
    let (status, body) = app
        .call(
            Method::POST,
            "/reports",
            Some(&citizen),
            Some(json!({"address": "  ", "description": "x", "status": "Operativo"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn photo_upload_is_served_back() {
    let app = app().await;
    let citizen = app.citizen("ana@syntra.co").await;
    let id = app.report(&citizen, "Inspección").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/reports/{}/photos", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", citizen))
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(Body::from(&b"\xff\xd8\xff fake jpeg"[..]))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let url = body["url"].as_str().unwrap();
    let path = url.strip_prefix("http://localhost:3000").unwrap();
    assert!(path.starts_with(&format!("/blobs/reports/{}/photo_", id)));

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&served[..], b"\xff\xd8\xff fake jpeg");

    let (_, report) = app
        .call(Method::GET, &format!("/reports/{}", id), Some(&citizen), None)
        .await;
    assert_eq!(report["photo_count"], 1);

    let (status, photos) = app
        .call(Method::GET, &format!("/reports/{}/photos", id), Some(&citizen), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(photos[0]["url"], url);
}

#[tokio::test]
async fn feedback_is_citizen_only_and_author_deletable() {
    let app = app().await;
    let ana = app.citizen("ana@syntra.co").await;
    let bea = app.citizen("bea@syntra.co").await;
    let agent = app.agent("agente@transito.gov.co").await;

    let (status, comment) = app
        .call(Method::POST, "/feedback", Some(&ana), Some(json!({"message": "  Buena app  "})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["message"], "Buena app");
    assert_eq!(comment["author_name"], "Ana");

    let (status, _) = app
        .call(Method::POST, "/feedback", Some(&agent), Some(json!({"message": "hola"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, list) = app.call(Method::GET, "/feedback", Some(&agent), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let uri = format!("/feedback/{}", comment["id"].as_str().unwrap());
    let (status, _) = app.call(Method::DELETE, &uri, Some(&bea), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::DELETE, &uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn chat_answers_from_rules() {
    let app = app().await;
    let citizen = app.citizen("ana@syntra.co").await;

    let (status, welcome) = app.call(Method::GET, "/chat/welcome", Some(&citizen), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(welcome["text"].as_str().unwrap().contains("SyntraBot"));

    let (status, reply) = app
        .call(
            Method::POST,
            "/chat",
            Some(&citizen),
            Some(json!({"message": "quiero hacer un reporte"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["is_user"], false);
    let actions = reply["actions"].as_array().unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0]["label"], "📍 Reportar falla");
    assert_eq!(
        actions[0]["destination"],
        "report_screen/usuario?fromMenu=false&fromMap=false&fromChatbot=true"
    );

    // No completion backend configured
    let (_, reply) = app
        .call(Method::POST, "/chat", Some(&citizen), Some(json!({"message": "qué hora es"})))
        .await;
    assert_eq!(
        reply["text"],
        "No pude conectar con el servidor de IA 🤖. Intentémoslo de nuevo más tarde."
    );

    let (status, history) = app.call(Method::GET, "/chat/history", Some(&citizen), None).await;
    assert_eq!(status, StatusCode::OK);
    let messages: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["message"].as_str().unwrap())
        .collect();
    assert_eq!(messages, vec!["quiero hacer un reporte", "qué hora es"]);

    let (status, _) = app.call(Method::DELETE, "/chat/history", Some(&citizen), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, history) = app.call(Method::GET, "/chat/history", Some(&citizen), None).await;
    assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn geocode_falls_back_to_coordinates() {
    let app = app().await;
    let citizen = app.citizen("ana@syntra.co").await;

    let (status, body) = app
        .call(Method::GET, "/geocode?lat=4.6482837&lng=-74.0478732", Some(&citizen), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], "Coordenadas: 4.64828, -74.04787");
    assert_eq!(body["resolved"], false);
}

#[tokio::test]
async fn device_token_and_test_notification() {
    let app = app().await;
    let citizen = app.citizen("ana@syntra.co").await;

    let (status, _) = app
        .call(Method::PUT, "/me/device-token", Some(&citizen), Some(json!({"token": "fcm-abc"})))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call(Method::POST, "/notifications/test", Some(&citizen), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, inbox) = app.call(Method::GET, "/notifications", Some(&citizen), None).await;
    assert_eq!(inbox[0]["title"], "Syntra Notificación");
    assert_eq!(inbox[0]["body"], "Prueba exitosa desde tu app 🚦");

    let (status, _) = app.call(Method::DELETE, "/notifications", Some(&citizen), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, inbox) = app.call(Method::GET, "/notifications", Some(&citizen), None).await;
    assert!(inbox.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn password_change_requires_current_password() {
    let app = app().await;
    let citizen = app.citizen("ana@syntra.co").await;

    let (status, _) = app
        .call(
            Method::POST,
            "/me/password",
            Some(&citizen),
            Some(json!({"current_password": "nope", "new_password": "nuevo123"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(
            Method::POST,
            "/me/password",
            Some(&citizen),
            Some(json!({"current_password": "secreto1", "new_password": "nuevo123"})),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "ana@syntra.co", "password": "nuevo123"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

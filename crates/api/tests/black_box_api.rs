use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use sentinel_auth::{ExternalIdentity, IssuerPolicy, IssuerRouter, JwtVerifier, User};
use sentinel_core::{RoleId, SystemClock, UserId};
use sentinel_infra::seed::{AUTH_OBSERVER_ID, SECURITY_AUDITOR_ID};
use sentinel_infra::{IdentityStore, InMemoryIdentityStore, SecurityAuditService, SharedStore};

const OKTA_SECRET: &str = "okta-test-secret";
const MS_SECRET: &str = "microsoft-test-secret";
const AUDIENCE: &str = "api://sentinel";
const OKTA_ISSUER: &str = "https://dev-1.okta.com/oauth2/default";
const MS_ISSUER: &str = "https://login.microsoftonline.com/tenant-1/v2.0";

struct TestServer {
    base_url: String,
    store: SharedStore,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let store: SharedStore = Arc::new(InMemoryIdentityStore::new());
        let router = IssuerRouter::new(
            vec![
                IssuerPolicy::okta("dev-1.okta.com", AUDIENCE),
                IssuerPolicy::microsoft("tenant-1", AUDIENCE),
            ],
            "okta",
        )
        .expect("valid issuer policies");
        let verifier = JwtVerifier::new()
            .with_secret("okta", OKTA_SECRET.as_bytes())
            .with_secret("microsoft", MS_SECRET.as_bytes());
        let service =
            SecurityAuditService::new(store.clone(), router, Arc::new(verifier), Arc::new(SystemClock));
        service.initialize().await.expect("seed");

        // Build app (same router as prod), but bind to an ephemeral port.
        let app = sentinel_api::app::build_app(service);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            store,
            handle,
        }
    }

    /// Role administration happens out of band; seed an auditor directly.
    async fn insert_auditor(&self, uid: &str) -> UserId {
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            identity: ExternalIdentity::new("okta", uid),
            email: format!("{uid}@example.com"),
            name: uid.to_string(),
            role_id: SECURITY_AUDITOR_ID,
            created_at: now,
            last_login_at: now,
        };
        self.store.insert_user(&user).await.unwrap();
        user.id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint(issuer: &str, secret: &str, subject_claim: &str, subject: &str) -> String {
    let now = Utc::now();
    let mut claims = json!({
        "iss": issuer,
        "aud": AUDIENCE,
        "iat": now.timestamp(),
        "exp": (now + ChronoDuration::minutes(10)).timestamp(),
        "email": format!("{subject}@example.com"),
        "name": subject,
    });
    claims[subject_claim] = json!(subject);

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn okta_token(uid: &str) -> String {
    mint(OKTA_ISSUER, OKTA_SECRET, "uid", uid)
}

#[tokio::test]
async fn health_is_public_and_everything_else_requires_a_credential() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(format!("{}/whoami", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth("garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn okta_issuer_with_microsoft_signature_is_rejected() {
    let srv = TestServer::spawn().await;
    let token = mint(OKTA_ISSUER, MS_SECRET, "uid", "mallory");

    let res = reqwest::Client::new()
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_is_idempotent_and_scoped_per_issuer() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let first: serde_json::Value = client
        .post(format!("{}/session/login", srv.base_url))
        .bearer_auth(okta_token("alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let again: serde_json::Value = client
        .post(format!("{}/session/login", srv.base_url))
        .bearer_auth(okta_token("alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["id"], again["id"]);
    assert_eq!(first["role"], "BasicUser");

    // Same subject from Microsoft is a different identity; its email clashes.
    let res = client
        .post(format!("{}/session/login", srv.base_url))
        .bearer_auth(mint(MS_ISSUER, MS_SECRET, "oid", "alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let whoami: serde_json::Value = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(okta_token("alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(whoami["provider"], "okta");
    assert_eq!(whoami["user"]["id"], first["id"]);
}

#[tokio::test]
async fn basic_users_are_refused_without_naming_the_claim() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = okta_token("bob");

    client
        .post(format!("{}/session/login", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    for path in ["/events", "/events/auth", "/events/roles"] {
        let res = client
            .get(format!("{}{}", srv.base_url, path))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN, "{path}");
        let body = res.text().await.unwrap();
        assert!(!body.contains("Audit."), "{path} leaked claim name: {body}");
    }
}

#[tokio::test]
async fn auditor_assigns_role_and_change_is_audited() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin_id = srv.insert_auditor("admin").await;
    let admin = okta_token("admin");
    let carol = okta_token("carol");

    let carol_user: serde_json::Value = client
        .post(format!("{}/session/login", srv.base_url))
        .bearer_auth(&carol)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let carol_id = carol_user["id"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/events/auth", srv.base_url))
        .bearer_auth(&carol)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Carol cannot promote herself.
    let res = client
        .post(format!("{}/users/{}/role", srv.base_url, carol_id))
        .bearer_auth(&carol)
        .json(&json!({ "role_id": SECURITY_AUDITOR_ID }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(format!("{}/users/{}/role", srv.base_url, carol_id))
        .bearer_auth(&admin)
        .json(&json!({ "role_id": AUTH_OBSERVER_ID }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Takes effect on the very next request.
    let res = client
        .get(format!("{}/events/auth", srv.base_url))
        .bearer_auth(&carol)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = client
        .get(format!("{}/events/roles", srv.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_type"], "RoleAssigned");
    assert_eq!(events[0]["details"], "from=BasicUser to=AuthObserver");
    assert_eq!(events[0]["author"]["id"], admin_id.to_string());
    assert_eq!(events[0]["affected"]["id"], carol_id);

    let res = client
        .post(format!("{}/users/{}/role", srv.base_url, carol_id))
        .bearer_auth(&admin)
        .json(&json!({ "role_id": RoleId::new() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let status: serde_json::Value = client
        .get(format!("{}/events/verify", srv.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["verified_events"], 2);
    assert_eq!(status["head"]["sequence"], 2);
    let head_hash = status["head"]["chain_hash"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/events/verify", srv.base_url))
        .query(&[("sequence", "2"), ("chain_hash", head_hash.as_str())])
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // A pin beyond the stored head means rows were dropped from the end.
    let res = client
        .get(format!("{}/events/verify", srv.base_url))
        .query(&[("sequence", "5"), ("chain_hash", head_hash.as_str())])
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "audit_chain_broken");

    let res = client
        .get(format!("{}/events/verify?sequence=2", srv.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

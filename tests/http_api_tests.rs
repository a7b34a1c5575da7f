//! HTTP surface tests
//!
//! Drives the axum router with in-process requests: header extraction,
//! route shapes, status and pagination-header rendering, and fixture-file
//! boot.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use portcullis::config::PolicyConfig;
use portcullis::credential::CredentialKind;
use portcullis::dispatch::Dispatcher;
use portcullis::membership::{AccessLevel, Membership, MembershipState, MembershipTarget};
use portcullis::model::{PrincipalKind, Resource, ResourceKind, Scope, Visibility};
use portcullis::store::{
    Collection, CredentialRecord, InMemoryStore, Item, NoopJobTrigger, NoopRateLimiter,
};
use portcullis::transport::build_router;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use tower::ServiceExt;

// =============================================================================
// Test Helpers
// =============================================================================

fn seeded_store() -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    store.seed_resource(Resource {
        id: 1,
        kind: ResourceKind::Project,
        path: "acme/app".to_string(),
        visibility: Visibility::Private,
        namespace_chain: vec![100],
        feature_levels: vec![],
    });
    for (id, name) in [(1, "main"), (2, "develop"), (3, "feature/x")] {
        store.seed_item(
            1,
            Collection::Branches,
            Item {
                id,
                name: name.to_string(),
                fields: json!({"merged": false}),
                created_at: id * 100,
                updated_at: id * 100,
            },
        );
    }
    store.add_credential(
        "glpat-maintainer",
        CredentialRecord {
            id: 7,
            kind: CredentialKind::PersonalAccessToken,
            owner_id: 7,
            owner_kind: PrincipalKind::User,
            scopes: BTreeSet::from([Scope::Api]),
            revoked: false,
            expires_at: None,
            owner_blocked: false,
            admin_mode: false,
        },
    );
    store.seed_membership(Membership {
        principal_id: 7,
        target: MembershipTarget::Resource(1),
        level: AccessLevel::Maintainer,
        state: MembershipState::Active,
        updated_at: 0,
    });
    Arc::new(store)
}

fn router(store: Arc<InMemoryStore>) -> Router {
    let dispatcher = Arc::new(Dispatcher::new(
        store,
        PolicyConfig::default(),
        Arc::new(NoopRateLimiter),
        Arc::new(NoopJobTrigger),
    ));
    build_router(dispatcher)
}

async fn get(router: &Router, uri: &str, token: Option<&str>) -> Response<Body> {
    let mut request = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        request = request.header("PRIVATE-TOKEN", token);
    }
    router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// Routes and statuses
// =============================================================================

#[tokio::test]
async fn test_list_branches_with_token() {
    let app = router(seeded_store());
    let response = get(
        &app,
        "/api/v4/projects/1/repository/branches",
        Some("glpat-maintainer"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("X-Total").unwrap().to_str().unwrap(),
        "3"
    );

    let body = body_json(response).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["name"].as_str().unwrap())
        .collect();
    // Default ordering is id ascending.
    assert_eq!(names, vec!["main", "develop", "feature/x"]);
}

#[tokio::test]
async fn test_private_project_hidden_without_token() {
    let app = router(seeded_store());
    let response = get(&app, "/api/v4/projects/1/repository/branches", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["message"], "404 Project Not Found");
}

#[tokio::test]
async fn test_pagination_headers() {
    let app = router(seeded_store());
    let response = get(
        &app,
        "/api/v4/projects/1/repository/branches?page=2&per_page=1",
        Some("glpat-maintainer"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("X-Page").unwrap(), "2");
    assert_eq!(headers.get("X-Per-Page").unwrap(), "1");
    assert_eq!(headers.get("X-Total-Pages").unwrap(), "3");
    assert_eq!(headers.get("X-Next-Page").unwrap(), "3");
    assert_eq!(headers.get("X-Prev-Page").unwrap(), "1");

    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_single_branch() {
    let app = router(seeded_store());
    let response = get(
        &app,
        "/api/v4/projects/1/repository/branches/main",
        Some("glpat-maintainer"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "main");

    let response = get(
        &app,
        "/api/v4/projects/1/repository/branches/nope",
        Some("glpat-maintainer"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_badge_roundtrip() {
    let app = router(seeded_store());
    let request = Request::builder()
        .method("POST")
        .uri("/api/v4/projects/1/badges")
        .header("PRIVATE-TOKEN", "glpat-maintainer")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": "coverage", "link_url": "https://ci.example.com"}).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["name"], "coverage");
    assert_eq!(body["link_url"], "https://ci.example.com");

    let response = get(&app, "/api/v4/projects/1/badges", Some("glpat-maintainer")).await;
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_add_member_invalid_access_level() {
    let app = router(seeded_store());
    let request = Request::builder()
        .method("POST")
        .uri("/api/v4/projects/1/members")
        .header("PRIVATE-TOKEN", "glpat-maintainer")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"user_id": 8, "access_level": "developer"}).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "access_level is invalid");
}

#[tokio::test]
async fn test_remove_member_route() {
    let store = seeded_store();
    store.seed_membership(Membership {
        principal_id: 8,
        target: MembershipTarget::Resource(1),
        level: AccessLevel::Guest,
        state: MembershipState::Active,
        updated_at: 0,
    });
    let app = router(store);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v4/projects/1/members/8")
        .header("PRIVATE-TOKEN", "glpat-maintainer")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_update_member_route() {
    let store = seeded_store();
    store.seed_membership(Membership {
        principal_id: 8,
        target: MembershipTarget::Resource(1),
        level: AccessLevel::Guest,
        state: MembershipState::Active,
        updated_at: 0,
    });
    let app = router(store);

    let request = Request::builder()
        .method("PUT")
        .uri("/api/v4/projects/1/members/8")
        .header("PRIVATE-TOKEN", "glpat-maintainer")
        .header("content-type", "application/json")
        .body(Body::from(json!({"access_level": 30}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["access_level"], 30);

    let request = Request::builder()
        .method("PUT")
        .uri("/api/v4/projects/1/members/99")
        .header("PRIVATE-TOKEN", "glpat-maintainer")
        .header("content-type", "application/json")
        .body(Body::from(json!({"access_level": 30}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_basic_auth_deploy_token_on_packages() {
    let store = seeded_store();
    store.add_basic_credential(
        "gitlab+deploy-token-1",
        "dt-secret",
        CredentialRecord {
            id: 9,
            kind: CredentialKind::DeployToken,
            owner_id: 900,
            owner_kind: PrincipalKind::DeployToken,
            scopes: BTreeSet::from([Scope::ReadRegistry]),
            revoked: false,
            expires_at: None,
            owner_blocked: false,
            admin_mode: false,
        },
    );
    store.seed_membership(Membership {
        principal_id: 900,
        target: MembershipTarget::Resource(1),
        level: AccessLevel::Reporter,
        state: MembershipState::Active,
        updated_at: 0,
    });
    let app = router(store);

    let encoded = STANDARD.encode("gitlab+deploy-token-1:dt-secret");
    let request = Request::builder()
        .method("GET")
        .uri("/api/v4/projects/1/packages")
        .header("authorization", format!("Basic {encoded}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_basic_auth_is_unauthorized() {
    let app = router(seeded_store());
    let request = Request::builder()
        .method("GET")
        .uri("/api/v4/projects/1/repository/branches")
        .header("authorization", "Basic %%%not-base64%%%")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protect_and_unprotect_branch() {
    let app = router(seeded_store());

    let request = Request::builder()
        .method("POST")
        .uri("/api/v4/projects/1/protected_branches")
        .header("PRIVATE-TOKEN", "glpat-maintainer")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": "release/*", "push_access_level": 40}).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["name"], "release/*");
    assert_eq!(body["push_access_level"], 40);

    let response = get(
        &app,
        "/api/v4/projects/1/protected_branches",
        Some("glpat-maintainer"),
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v4/projects/1/protected_branches/release%2F%2A")
        .header("PRIVATE-TOKEN", "glpat-maintainer")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get(
        &app,
        "/api/v4/projects/1/protected_branches",
        Some("glpat-maintainer"),
    )
    .await;
    let body = body_json(response).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_members_all_includes_inherited() {
    let store = seeded_store();
    store.seed_membership(Membership {
        principal_id: 8,
        target: MembershipTarget::Namespace(100),
        level: AccessLevel::Reporter,
        state: MembershipState::Active,
        updated_at: 0,
    });
    let app = router(store);

    let direct = get(&app, "/api/v4/projects/1/members", Some("glpat-maintainer")).await;
    let direct = body_json(direct).await;
    assert_eq!(direct.as_array().unwrap().len(), 1);

    let all = get(
        &app,
        "/api/v4/projects/1/members/all",
        Some("glpat-maintainer"),
    )
    .await;
    let all = body_json(all).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

// =============================================================================
// Fixture boot
// =============================================================================

#[tokio::test]
async fn test_store_boots_from_fixture_file() {
    let fixture = r#"
[[resources]]
id = 1
kind = "project"
path = "acme/app"
visibility = "public"
namespace_chain = [100]

[[items]]
resource = 1
collection = "branches"
id = 1
name = "main"
created_at = 100
updated_at = 100

[[credentials]]
token = "glpat-fixture"
id = 1
kind = "personal_access_token"
owner_id = 7
owner_kind = "user"
scopes = ["api"]
"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(fixture.as_bytes()).unwrap();

    let store = InMemoryStore::from_fixture_file(file.path().to_str().unwrap()).unwrap();
    let app = router(Arc::new(store));

    let response = get(
        &app,
        "/api/v4/projects/1/repository/branches",
        Some("glpat-fixture"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body[0]["name"], "main");
}

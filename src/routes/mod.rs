pub mod tenant_routes;

use crate::error::AppError;
use crate::state::SharedState;
use crate::tenant::{self, RequestAttributes};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;

pub fn app(state: SharedState) -> Router {
    let api = Router::new()
        .route(
            "/tenants",
            get(tenant_routes::list_tenants).post(tenant_routes::create_tenant),
        )
        .route("/tenants/pinned", get(tenant_routes::list_pinned))
        .route(
            "/tenants/{name}",
            get(tenant_routes::get_tenant).delete(tenant_routes::delete_tenant),
        );

    // Host routes serve requests without tenant attributes; everything else
    // is handed to the selected tenant before routing.
    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .fallback(not_found)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, tenant_dispatch))
        .layer(TraceLayer::new_for_http())
}

async fn tenant_dispatch(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let attrs = RequestAttributes::from_headers(req.headers(), &state.config.routing);
    let selected = match tenant::select(&attrs, state.store.as_ref()) {
        Ok(selected) => selected,
        Err(e) => return AppError::from(e).into_response(),
    };
    let Some(id) = selected else {
        return next.run(req).await;
    };

    match state.registry.get_or_create(&id).await {
        Ok(app) => app.dispatch(req).await,
        Err(e) => AppError::from(e).into_response(),
    }
}

async fn health_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let uptime = chrono::Utc::now() - state.started_at;
    Json(serde_json::json!({
        "status": "ok",
        "service": "apphost",
        "started_at": state.started_at.to_rfc3339(),
        "uptime_secs": uptime.num_seconds(),
        "tenants_loaded": state.registry.snapshot().len(),
    }))
}

/// Unmatched host paths. A request that carried an alias nothing resolved
/// was aimed at a tenant, so it is reported as one.
async fn not_found(State(state): State<SharedState>, headers: HeaderMap) -> AppError {
    match RequestAttributes::from_headers(&headers, &state.config.routing).routing_alias {
        Some(alias) => AppError::UnknownTenant(alias),
        None => AppError::NotFound("no such route".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostConfig, StorageTemplate, MEMORY_PATH};
    use crate::db::{pool::DbPool, run_migrations};
    use crate::state::AppState;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::path::PathBuf;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        let mut config: HostConfig = toml::from_str("").unwrap();
        config.storage = StorageTemplate {
            path: Some(PathBuf::from(MEMORY_PATH)),
            ..StorageTemplate::default()
        };
        let db = DbPool::open_in_memory().unwrap();
        run_migrations(&db).unwrap();
        AppState::build(config, db)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn host_health_without_tenant_attributes() {
        let app = app(test_state());
        let (status, json) = call(&app, "GET", "/health", &[], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["service"], "apphost");
    }

    #[tokio::test]
    async fn admin_create_get_list_delete() {
        let state = test_state();
        let app = app(state.clone());

        let (status, json) = call(
            &app,
            "POST",
            "/api/tenants",
            &[],
            Some(serde_json::json!({ "name": "acme", "pinned": true })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["state"], "ready");

        let (status, _) = call(
            &app,
            "POST",
            "/api/tenants",
            &[],
            Some(serde_json::json!({ "name": "acme" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            &app,
            "POST",
            "/api/tenants",
            &[],
            Some(serde_json::json!({ "name": "Not Valid" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, json) = call(&app, "GET", "/api/tenants/pinned", &[], None).await;
        assert_eq!(json.as_array().map(|a| a.len()), Some(1));

        let (status, json) = call(&app, "GET", "/api/tenants/acme", &[], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "acme");

        let (status, _) = call(&app, "DELETE", "/api/tenants/acme", &[], None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!state.registry.has("acme"));

        let (status, _) = call(&app, "DELETE", "/api/tenants/acme", &[], None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn override_header_routes_into_the_tenant() {
        let state = test_state();
        let app = app(state.clone());
        call(
            &app,
            "POST",
            "/api/tenants",
            &[],
            Some(serde_json::json!({ "name": "acme" })),
        )
        .await;

        let (status, json) = call(&app, "GET", "/api/info", &[("x-app", "acme")], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tenant"], "acme");

        // Tenant-scoped requests never reach the host routes.
        let (_, json) = call(&app, "GET", "/health", &[("x-app", "acme")], None).await;
        assert_eq!(json["tenant"], "acme");
    }

    #[tokio::test]
    async fn unknown_tenant_is_404() {
        let app = app(test_state());
        let (status, json) = call(&app, "GET", "/api/info", &[("x-app", "ghost")], None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "unknown tenant: ghost");

        let (status, json) =
            call(&app, "GET", "/api/info", &[("x-hostname", "nobody.example.com")], None).await;
        // an unmatched alias selects no tenant; the host has no such route
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "unknown tenant: nobody.example.com");

        // host routes still answer requests carrying a stray alias
        let (status, _) =
            call(&app, "GET", "/health", &[("x-hostname", "nobody.example.com")], None).await;
        assert_eq!(status, StatusCode::OK);
    }
}

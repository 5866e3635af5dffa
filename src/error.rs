use crate::metadata::MetadataError;
use crate::tenant::TenantError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),
    #[error("tenant unavailable: {0}")]
    TenantUnavailable(String),
    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TenantError> for AppError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::UnknownTenant(name) => AppError::UnknownTenant(name),
            other => AppError::TenantUnavailable(other.to_string()),
        }
    }
}

impl From<MetadataError> for AppError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(name) => AppError::NotFound(format!("tenant {}", name)),
            MetadataError::Conflict(msg) => AppError::Conflict(msg),
            MetadataError::Invalid(msg) => AppError::BadRequest(msg),
            MetadataError::Hook(e) => e.into(),
            MetadataError::Db(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::UnknownTenant(name) => {
                (StatusCode::NOT_FOUND, format!("unknown tenant: {}", name))
            }
            AppError::TenantUnavailable(reason) => {
                tracing::warn!("tenant unavailable: {}", reason);
                (StatusCode::SERVICE_UNAVAILABLE, "tenant unavailable".into())
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".into(),
                )
            }
        };
        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::FailureKind;
    use axum::body::to_bytes;

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn not_found_returns_404() {
        let err = AppError::NotFound("tenant xyz".into());
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "tenant xyz");
    }

    #[tokio::test]
    async fn unknown_tenant_returns_404_with_name() {
        let err: AppError = TenantError::UnknownTenant("ghost".into()).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "unknown tenant: ghost");
    }

    #[tokio::test]
    async fn initialization_failure_is_503_without_details() {
        let err: AppError = TenantError::Initialization {
            id: "bad".into(),
            kind: FailureKind::Provisioning,
            reason: "password authentication failed for user app".into(),
        }
        .into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "tenant unavailable");
    }

    #[tokio::test]
    async fn metadata_conflict_returns_409() {
        let err: AppError = MetadataError::Conflict("tenant 'acme' already exists".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let err = AppError::Internal(anyhow::anyhow!("db connection pool exhausted"));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        // must not leak internal detail
        assert_eq!(json["error"], "internal server error");
    }
}

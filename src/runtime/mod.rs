//! Tenant runtime capability: something that can be started from a
//! [`TenantConfig`], serve requests, and be stopped.

pub mod embedded;

use crate::tenant::derive::TenantConfig;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use std::sync::Arc;

pub use embedded::EmbeddedRuntime;

/// A started tenant application.
#[async_trait]
pub trait TenantApp: Send + Sync {
    fn name(&self) -> &str;

    /// Serve one request routed to this tenant.
    async fn dispatch(&self, req: Request<Body>) -> Response;

    /// Release the app's resources. Called at most once, by the registry.
    async fn shutdown(&self) -> anyhow::Result<()>;
}

/// Starts tenant apps. Each returned app is started exactly once.
#[async_trait]
pub trait TenantRuntime: Send + Sync {
    async fn start(&self, config: TenantConfig) -> anyhow::Result<Arc<dyn TenantApp>>;

    /// Best-effort stop; the registry logs errors and never propagates them.
    async fn stop(&self, app: Arc<dyn TenantApp>) -> anyhow::Result<()> {
        app.shutdown().await
    }
}

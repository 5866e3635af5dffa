use crate::config::RoutingConfig;
use crate::metadata::MetadataStore;
use crate::tenant::error::TenantError;
use crate::tenant::naming;
use axum::http::HeaderMap;

/// The two request attributes tenant selection looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAttributes {
    pub tenant_override: Option<String>,
    pub routing_alias: Option<String>,
}

impl RequestAttributes {
    pub fn from_headers(headers: &HeaderMap, routing: &RoutingConfig) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        };
        Self {
            tenant_override: header(&routing.override_header),
            routing_alias: header(&routing.alias_header),
        }
    }
}

/// Resolves a routing alias to a tenant identifier.
pub trait AliasLookup: Send + Sync {
    fn lookup_alias(&self, alias: &str) -> Result<Option<String>, TenantError>;
}

impl AliasLookup for MetadataStore {
    fn lookup_alias(&self, alias: &str) -> Result<Option<String>, TenantError> {
        self.find_by_alias(alias)
            .map(|record| record.map(|r| r.name))
            .map_err(TenantError::metadata)
    }
}

/// Pick the tenant a request belongs to.
///
/// An explicit override wins and is taken verbatim; otherwise the routing
/// alias is looked up once; otherwise the request belongs to the host.
pub fn select(
    attrs: &RequestAttributes,
    lookup: &dyn AliasLookup,
) -> Result<Option<String>, TenantError> {
    if let Some(id) = attrs.tenant_override.as_deref().filter(|s| !s.is_empty()) {
        return Ok(Some(id.to_string()));
    }

    let Some(raw) = attrs.routing_alias.as_deref() else {
        return Ok(None);
    };
    let alias = naming::normalize_alias(raw);
    if alias.is_empty() {
        return Ok(None);
    }
    lookup.lookup_alias(&alias)
}

//! `config` module: browser-facing configuration.

use axum::{middleware, routing::get, Extension, Json, Router};
use serde::Serialize;

use crate::http::context::RequestContext;
use crate::modules::{ModuleDescriptor, ModuleError, MountContext, ServerModule};
use crate::security::require_auth;

pub const NAME: &str = "config";

/// What the browser receives.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigView {
    pub feature_flags: std::collections::BTreeMap<String, bool>,
    pub client: serde_json::Value,
}

impl ClientConfigView {
    pub fn from_context(ctx: &RequestContext) -> Self {
        Self {
            feature_flags: ctx.config.feature_flags.clone(),
            client: ctx.config.client.config_overrides.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigModule;

impl ServerModule for ConfigModule {
    fn name(&self) -> &str {
        NAME
    }

    fn mount(&self, cx: &MountContext<'_>) -> Result<ModuleDescriptor, ModuleError> {
        let router = Router::new()
            .route("/", get(current_config))
            .layer(middleware::from_fn_with_state(cx.gate.clone(), require_auth));
        Ok(ModuleDescriptor::new(NAME, "/config").with_http(router))
    }
}

async fn current_config(Extension(ctx): Extension<RequestContext>) -> Json<ClientConfigView> {
    tracing::debug!(parent: &ctx.span, "Serving client configuration");
    Json(ClientConfigView::from_context(&ctx))
}

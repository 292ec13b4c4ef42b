//! `client` module: serves the browser bundle.

use std::path::Path;

use axum::Router;
use tower_http::services::{ServeDir, ServeFile};

use crate::modules::{ModuleDescriptor, ModuleError, MountContext, ServerModule};

pub const NAME: &str = "client";

/// Static files with a single-page-app fallback to `index.html`.
#[derive(Debug, Default)]
pub struct ClientModule;

impl ServerModule for ClientModule {
    fn name(&self) -> &str {
        NAME
    }

    fn mount(&self, cx: &MountContext<'_>) -> Result<ModuleDescriptor, ModuleError> {
        let public_dir = Path::new(&cx.config.client.public_dir);
        if !public_dir.is_dir() {
            tracing::warn!(public_dir = %public_dir.display(), "Public directory does not exist");
        }

        let index = ServeFile::new(public_dir.join("index.html"));
        let files = ServeDir::new(public_dir).fallback(index);

        Ok(ModuleDescriptor::new(NAME, "/").with_http(Router::new().fallback_service(files)))
    }
}

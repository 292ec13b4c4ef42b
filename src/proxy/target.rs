//! Backend target shared by the reverse proxy and the websocket relay.

use std::sync::Arc;

use url::Url;

use crate::config::ProxyConfig;
use crate::net::tls::{backend_client_config, TlsError};

/// Errors building a backend target.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Where the backend admin API lives and how to reach it.
///
/// TLS is used when a certificate authority is configured. Both the HTTP and
/// the websocket side use the same trust settings.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    web: Url,
    socket: Url,
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl ProxyTarget {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, TargetError> {
        let tls = backend_client_config(&config.transport)?.map(Arc::new);
        let secure = tls.is_some();

        let (web_scheme, socket_scheme) = if secure { ("https", "wss") } else { ("http", "ws") };
        let root = normalize_root(&config.context_root);
        let web = Url::parse(&format!(
            "{web_scheme}://{}:{}{root}",
            config.hostname, config.port
        ))?;
        let socket = Url::parse(&format!(
            "{socket_scheme}://{}:{}{root}",
            config.hostname, config.port
        ))?;

        Ok(Self { web, socket, tls })
    }

    /// Base URL for HTTP requests, including the context root.
    pub fn web_url(&self) -> &Url {
        &self.web
    }

    /// URL the relay opens its backend socket to.
    pub fn socket_url(&self) -> &Url {
        &self.socket
    }

    pub fn tls(&self) -> Option<&Arc<rustls::ClientConfig>> {
        self.tls.as_ref()
    }

    /// Outbound URL for a path already relative to the mount point.
    pub fn web_url_for(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.web.clone();
        let base = url.path().trim_end_matches('/').to_string();
        let path = if path.starts_with('/') { path.to_string() } else { format!("/{path}") };
        url.set_path(&format!("{base}{path}"));
        url.set_query(query);
        url
    }
}

fn normalize_root(root: &str) -> String {
    let trimmed = root.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

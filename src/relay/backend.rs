//! Opening the backend side of a relay.

use axum::http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderMap, HeaderValue};
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest};
use tokio_tungstenite::{connect_async_tls_with_config, Connector};

use crate::proxy::ProxyTarget;
use crate::relay::frame::BackendSocket;

/// Open a websocket to the backend and wait until it is ready.
///
/// The client's requested subprotocols, if any, are offered to the backend
/// unchanged. Returns the socket and the subprotocol the backend selected.
pub async fn connect_backend(
    target: &ProxyTarget,
    protocol: Option<&HeaderValue>,
) -> Result<(BackendSocket, Option<String>), tungstenite::Error> {
    let mut request = target.socket_url().as_str().into_client_request()?;
    if let Some(protocol) = protocol {
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
    }

    let connector = match target.tls() {
        Some(tls) => Connector::Rustls(tls.clone()),
        None => Connector::Plain,
    };

    let (socket, response) =
        connect_async_tls_with_config(request, None, false, Some(connector)).await?;
    let selected = selected_protocol(response.headers());
    tracing::debug!(
        url = %target.socket_url(),
        status = %response.status(),
        protocol = ?selected,
        "Backend socket open"
    );
    Ok((socket, selected))
}

fn selected_protocol(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

use crate::middleware::auth;
use crate::signalling::hub::CallHub;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the session may
/// arrive as a query parameter instead of the cookie.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<crate::AppState>,
) -> Result<impl IntoResponse, crate::error::Error> {
    let token = query
        .token
        .or_else(|| cookie_token(&headers))
        .ok_or_else(|| crate::error::Error::Unauthorized("Missing session".into()))?;
    let claims = auth::decode_session(&token)
        .ok_or_else(|| crate::error::Error::Unauthorized("Invalid session".into()))?;

    // A signed session is not enough: the account may have been deactivated
    // since the cookie was issued.
    match state.user_service.find_by_email(&claims.email).await? {
        Some(user) if user.is_active => {}
        _ => {
            return Err(crate::error::Error::Unauthorized(
                "Session is no longer valid".into(),
            ))
        }
    }

    let email = claims.email;
    let hub = state.call_hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, email, hub)))
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == auth::SESSION_COOKIE).then(|| value.to_string())
    })
}

async fn handle_socket(socket: WebSocket, email: String, hub: CallHub) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (conn_id, mut rx) = hub.register(&email);

    tracing::info!("Signalling channel opened for {}", email);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let recv_hub = hub.clone();
    let recv_email = email.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => recv_hub.handle_message(&recv_email, &text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    hub.unregister(&email, conn_id);
    tracing::info!("Signalling channel closed for {}", email);
}

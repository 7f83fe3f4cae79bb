use crate::error::SessionError;
use crate::guard::SessionGuard;
use crate::session::Session;
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Instant;
use tokio::time::{MissedTickBehavior, interval};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    // Frames above max_frame_bytes still have to reach the session so they
    // are dropped without tearing down the connection
    ws.max_message_size(state.session_config.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Create the session and take everything it holds outside its task.
///
/// Returns `None` when the id is already registered; the existing entry is
/// left untouched.
fn open_session(state: &AppState, session_id: &str) -> Option<(Session, SessionGuard)> {
    let session = Session::new(
        session_id,
        state.session_config.clone(),
        state.dispatcher.clone(),
        state.metrics.clone(),
    );

    // Subscribe before the first frame is submitted so no result can be missed
    let subscription = state.broadcast.subscribe(session_id);
    if !state.registry.register(session_id, session.stats()) {
        return None;
    }

    let guard = SessionGuard::new(
        session_id,
        subscription,
        state.registry.clone(),
        state.dispatcher.clone(),
        state.metrics.clone(),
    );
    Some((session, guard))
}

/// Drive one client connection until it closes or the transport fails.
///
/// Inbound frames, broadcast results and the inflight sweep are all
/// multiplexed on this one task, so the session needs no locking.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let Some((mut session, mut guard)) = open_session(&state, &session_id) else {
        tracing::error!(session_id = %session_id, "Session id already registered, closing connection");
        if let Err(e) = socket.send(Message::Close(None)).await {
            tracing::debug!(session_id = %session_id, error = %e, "Failed to send close frame");
        }
        return;
    };
    tracing::info!(session_id = %session_id, "Session connected");

    let (mut sink, mut stream) = socket.split();
    let mut sweep = interval(state.session_config.sweep_interval());
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let exit: Option<SessionError> = loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Binary(data))) => {
                    match session.on_frame(Bytes::from(data)) {
                        Ok(sequence) => tracing::trace!(session_id = %session_id, sequence, "Frame enqueued"),
                        Err(err) if err.is_drop() => tracing::debug!(session_id = %session_id, error = %err, "Frame dropped"),
                        Err(err) => tracing::warn!(session_id = %session_id, error = %err, "Frame rejected"),
                    }
                }
                Some(Ok(Message::Text(_))) => {
                    let err = session.on_text();
                    tracing::warn!(session_id = %session_id, error = %err, "Frame rejected");
                }
                Some(Ok(Message::Close(_))) | None => break None,
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(SessionError::Transport(e.to_string())),
            },
            result = guard.subscription().recv() => match result {
                Some(result) => {
                    let Some(result) = session.on_result(result) else {
                        continue;
                    };
                    let text = match serde_json::to_string(&result) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(session_id = %session_id, error = %e, "Failed to serialize result");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break Some(SessionError::Transport(e.to_string()));
                    }
                }
                None => break Some(SessionError::Transport("result channel closed".to_string())),
            },
            _ = sweep.tick() => {
                session.sweep(Instant::now());
            }
        }
    };

    if let Some(err) = exit {
        tracing::warn!(session_id = %session_id, error = %err, "Session terminated");
    }
    guard.close();

    let stats = session.stats().snapshot();
    tracing::info!(
        session_id = %session_id,
        frames_sent = stats.frames_sent,
        frames_dropped = stats.frames_dropped,
        results_delivered = stats.results_delivered,
        "Session disconnected"
    );
}

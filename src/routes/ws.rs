//! WebSocket upgrade + message loop. One `StudentSession` lives for the life
//! of the socket; each client message is parsed as JSON, dispatched to the
//! controller, and answered before the next message is read. That serial loop
//! is what guarantees "one action at a time" per student.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::controller::{self, AnswerOutcome, StudentSession};
use crate::error::TutorError;
use crate::protocol::{screen_out, ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "tutor_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let mut sess = StudentSession::new();
  info!(target: "session", session = %sess.id, "WebSocket connected");

  // Initial paint: the login screen, no network involved.
  let initial = ServerWsMessage::Screen { screen: screen_out(&sess, &state) };
  if send_json(&mut socket, &initial).await.is_err() {
    return;
  }

  'recv: while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let replies = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "session", session = %sess.id, "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &mut sess, &state).await
          }
          Err(e) => vec![to_error_msg(TutorError::Parse(format!("Invalid JSON: {}", e)))],
        };

        for reply in &replies {
          if send_json(&mut socket, reply).await.is_err() {
            info!(target: "session", session = %sess.id, "WebSocket dropped mid-reply");
            break 'recv;
          }
        }
      }
      Message::Ping(payload) => {
        let _ = socket.send(Message::Pong(payload)).await;
      }
      Message::Close(_) => break,
      _ => {}
    }
  }
  // A dropped socket ends the active conversation the same way an explicit
  // exit does, so an abandoned session still gets graded.
  controller::abandon(&mut sess, &state);
  info!(target: "session", session = %sess.id, "WebSocket disconnected");
}

async fn send_json(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), ()> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) })
      .to_string()
  });
  socket.send(Message::Text(out)).await.map_err(|e| {
    error!(target: "tutor_backend", error = %e, "WS send error");
  })
}

/// Dispatch one user action through the state machine. Every successful
/// transition is followed by a fresh screen snapshot; failures are converted
/// to the protocol error kinds and never tear the session down.
#[instrument(level = "info", skip(msg, sess, state), fields(session = %sess.id))]
async fn handle_client_ws(
  msg: ClientWsMessage,
  sess: &mut StudentSession,
  state: &Arc<AppState>,
) -> Vec<ServerWsMessage> {
  match msg {
    ClientWsMessage::Ping => vec![ServerWsMessage::Pong],

    ClientWsMessage::Login { name } => match controller::submit_login(sess, &name) {
      Ok(()) => vec![ServerWsMessage::Screen { screen: screen_out(sess, state) }],
      Err(e) => vec![to_error_msg(e)],
    },

    ClientWsMessage::SelectCategory { category } => {
      match controller::select_category(sess, state, &category) {
        Ok(()) => vec![ServerWsMessage::Screen { screen: screen_out(sess, state) }],
        Err(e) => vec![to_error_msg(e)],
      }
    }

    ClientWsMessage::SelectLecture { topic } => {
      match controller::select_lecture(sess, state, &topic) {
        Ok(()) => vec![ServerWsMessage::Screen { screen: screen_out(sess, state) }],
        Err(e) => vec![to_error_msg(e)],
      }
    }

    ClientWsMessage::StudentMessage { text } => {
      match controller::student_message(sess, state, &text).await {
        Ok(AnswerOutcome::Continued { tutor_reply }) => vec![
          ServerWsMessage::TutorReply { text: tutor_reply },
          ServerWsMessage::Screen { screen: screen_out(sess, state) },
        ],
        Ok(AnswerOutcome::Solved { problem_id, checkpoint, tutor_reply }) => vec![
          ServerWsMessage::Solved { problem_id, checkpoint, tutor_reply },
          ServerWsMessage::Screen { screen: screen_out(sess, state) },
        ],
        // The appended student turn is part of the snapshot even when the
        // tutor reply failed, so the client repaints a truthful transcript.
        Err(e) => vec![to_error_msg(e), ServerWsMessage::Screen { screen: screen_out(sess, state) }],
      }
    }

    ClientWsMessage::NextProblem { feedback } => {
      match controller::next_problem(sess, state, feedback.as_deref()) {
        Ok(()) => vec![ServerWsMessage::Screen { screen: screen_out(sess, state) }],
        Err(e) => vec![to_error_msg(e)],
      }
    }

    ClientWsMessage::ExitToMenu { feedback } => {
      match controller::exit_to_menu(sess, state, feedback.as_deref()) {
        Ok(()) => vec![ServerWsMessage::Screen { screen: screen_out(sess, state) }],
        Err(e) => vec![to_error_msg(e)],
      }
    }
  }
}

fn to_error_msg(e: TutorError) -> ServerWsMessage {
  match e {
    TutorError::Validation(_) => ServerWsMessage::ValidationError { message: e.user_message() },
    TutorError::Transport(_) => {
      ServerWsMessage::TransportError { message: e.user_message(), retryable: e.is_retryable() }
    }
    other => ServerWsMessage::Error { message: other.user_message() },
  }
}

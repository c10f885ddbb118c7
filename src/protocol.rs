//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogDiagnostic;
use crate::controller::{Screen, StudentSession};
use crate::domain::Role;
use crate::state::AppState;

/// Messages the client can send over WebSocket. Exactly one user action per
/// message; the server processes it to completion before reading the next.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Login {
        name: String,
    },
    SelectCategory {
        category: String,
    },
    SelectLecture {
        topic: String,
    },
    /// Free-form student input: checked as an answer in practice mode,
    /// forwarded as conversation in lectures.
    StudentMessage {
        text: String,
    },
    /// Terminal actions may carry feedback, relayed verbatim to the
    /// instructor report for the conversation being left.
    NextProblem {
        #[serde(default)]
        feedback: Option<String>,
    },
    ExitToMenu {
        #[serde(default)]
        feedback: Option<String>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    /// Full snapshot of the current screen, sent after every transition.
    Screen {
        screen: ScreenOut,
    },
    TutorReply {
        text: String,
    },
    Solved {
        problem_id: String,
        checkpoint: String,
        tutor_reply: Option<String>,
    },
    ValidationError {
        message: String,
    },
    /// Always phrased as transient; the dominant failure mode is upstream
    /// rate limiting and the user should simply retry.
    TransportError {
        message: String,
        retryable: bool,
    },
    Error {
        message: String,
    },
}

/// Screen snapshot DTO. The transcript carries visible turns only; hidden
/// directives never leave the server through this type.
#[derive(Debug, Serialize)]
pub struct ScreenOut {
    pub screen: &'static str,
    pub student: String,
    pub awaiting_model: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu: Option<MenuOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<ProblemOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub transcript: Vec<TurnOut>,
}

#[derive(Debug, Serialize)]
pub struct MenuOut {
    pub categories: Vec<CategoryOut>,
    pub lectures: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoryOut {
    pub prefix: String,
    pub label: String,
    pub problems: usize,
}

/// Problem fields safe for the student. `targets` stays server-side.
#[derive(Debug, Serialize)]
pub struct ProblemOut {
    pub id: String,
    pub category: String,
    pub statement: String,
    pub solved: bool,
}

#[derive(Debug, Serialize)]
pub struct TurnOut {
    pub role: Role,
    pub text: String,
}

/// Build the snapshot for the student's current screen.
pub fn screen_out(sess: &StudentSession, state: &AppState) -> ScreenOut {
    match &sess.screen {
        Screen::Login => ScreenOut {
            screen: "login",
            student: sess.name.clone(),
            awaiting_model: sess.awaiting_model,
            menu: None,
            problem: None,
            topic: None,
            transcript: vec![],
        },
        Screen::Menu => ScreenOut {
            screen: "menu",
            student: sess.name.clone(),
            awaiting_model: sess.awaiting_model,
            menu: Some(MenuOut {
                categories: state
                    .categories()
                    .into_iter()
                    .map(|(prefix, label, problems)| CategoryOut { prefix, label, problems })
                    .collect(),
                lectures: state.lectures.clone(),
            }),
            problem: None,
            topic: None,
            transcript: vec![],
        },
        Screen::Practice { problem, convo, solved } => ScreenOut {
            screen: "practice",
            student: sess.name.clone(),
            awaiting_model: sess.awaiting_model,
            menu: None,
            problem: Some(ProblemOut {
                id: problem.id.clone(),
                category: problem.category.clone(),
                statement: problem.statement.clone(),
                solved: *solved,
            }),
            topic: None,
            transcript: convo
                .visible_turns()
                .map(|t| TurnOut { role: t.role, text: t.text.clone() })
                .collect(),
        },
        Screen::Lecture { topic, convo } => ScreenOut {
            screen: "lecture",
            student: sess.name.clone(),
            awaiting_model: sess.awaiting_model,
            menu: None,
            problem: None,
            topic: Some(topic.clone()),
            transcript: convo
                .visible_turns()
                .map(|t| TurnOut { role: t.role, text: t.text.clone() })
                .collect(),
        },
    }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

/// Catalog summary for content authors: counts plus the load diagnostic, if
/// the source failed to parse.
#[derive(Serialize)]
pub struct CatalogOut {
    pub problems: usize,
    pub categories: Vec<CategoryOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<CatalogDiagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_snake_case_throughout() {
        let msg = ServerWsMessage::Solved {
            problem_id: "CAL_1_01".into(),
            checkpoint: "limit".into(),
            tutor_reply: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"problem_id\""));
        assert!(json.contains("\"tutor_reply\""));
        assert!(!json.contains("problemId"));
    }

    #[test]
    fn terminal_actions_accept_optional_feedback() {
        let bare: ClientWsMessage =
            serde_json::from_str(r#"{"type":"next_problem"}"#).unwrap();
        assert!(matches!(bare, ClientWsMessage::NextProblem { feedback: None }));

        let with: ClientWsMessage =
            serde_json::from_str(r#"{"type":"exit_to_menu","feedback":"went too fast"}"#).unwrap();
        assert!(
            matches!(with, ClientWsMessage::ExitToMenu { feedback: Some(f) } if f == "went too fast")
        );
    }
}

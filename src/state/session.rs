use serde::{Deserialize, Serialize};
use crate::state::app::AppState;

/// Who the offline queue and record cache currently belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    SignedOut,
    SignedIn { user_id: String },
}

impl SessionState {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            SessionState::SignedOut => None,
            SessionState::SignedIn { user_id } => Some(user_id),
        }
    }
}

/// Get the current session from AppState
pub fn current_user(state: &AppState) -> Option<String> {
    state.get_session().user_id().map(str::to_string)
}

/// Log the current session (for debugging)
pub fn log_session(state: &AppState) {
    match state.get_session() {
        SessionState::SignedOut => {
            tracing::debug!("Session = SignedOut");
        }
        SessionState::SignedIn { user_id } => {
            tracing::debug!(user_id = %user_id, "Session = SignedIn");
        }
    }
}

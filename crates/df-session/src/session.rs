use df_core::{ConversationTurn, Role};
use df_parser::GraphDocument;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const WELCOME_MESSAGE: &str = "• Welcome to the Control Flow Graph Generator!

• Key Features:
  - Create detailed flow diagrams
  - Get instant graph metrics
  - Optimize process layouts
  - Analyze flow complexity

• How to Use:
  - Type your process description
  - Click Generate to create graph
  - Use Refine for improvements

• Try describing a simple process to start!";

/// Smallest turn bound that still holds the welcome plus one exchange.
const MIN_RETAINED_TURNS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Turns of history included in each prompt.
    pub history_window: usize,
    /// Turns kept in the session; the oldest non-welcome turns go first.
    pub max_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_window: 5,
            max_turns: 50,
        }
    }
}

/// Serializable session state for an external store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub turns: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<GraphDocument>,
}

/// One conversation: its turns and the last graph that fully succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    turns: Vec<ConversationTurn>,
    document: Option<GraphDocument>,
    config: SessionConfig,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            turns: vec![welcome_turn()],
            document: None,
            config,
        }
    }

    #[must_use]
    pub fn from_snapshot(snapshot: SessionSnapshot, config: SessionConfig) -> Self {
        let mut session = Self {
            turns: snapshot.turns,
            document: snapshot.document,
            config,
        };
        if session.turns.is_empty() {
            session.turns.push(welcome_turn());
        }
        session.evict();
        session
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            turns: self.turns.clone(),
            document: self.document.clone(),
        }
    }

    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The turns that go into the next prompt.
    #[must_use]
    pub fn recent_turns(&self) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(self.config.history_window);
        &self.turns[start..]
    }

    #[must_use]
    pub fn current_document(&self) -> Option<&GraphDocument> {
        self.document.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Back to a fresh conversation with only the welcome message.
    pub fn clear(&mut self) {
        self.turns = vec![welcome_turn()];
        self.document = None;
        info!("session cleared");
    }

    /// Record a fully successful exchange.
    pub(crate) fn commit(
        &mut self,
        document: GraphDocument,
        user_input: &str,
        explanation: String,
    ) {
        info!(
            digest = %document.digest(),
            turns = self.turns.len() + 2,
            "session document replaced"
        );
        self.document = Some(document);
        self.turns.push(ConversationTurn::user(user_input));
        self.turns.push(ConversationTurn::assistant(explanation));
        self.evict();
    }

    fn evict(&mut self) {
        let limit = self.config.max_turns.max(MIN_RETAINED_TURNS);
        while self.turns.len() > limit {
            let Some(index) = self.turns.iter().position(|turn| !is_welcome(turn)) else {
                break;
            };
            self.turns.remove(index);
        }
    }
}

fn welcome_turn() -> ConversationTurn {
    ConversationTurn::assistant(WELCOME_MESSAGE)
}

fn is_welcome(turn: &ConversationTurn) -> bool {
    turn.role == Role::Assistant && turn.content == WELCOME_MESSAGE
}

use super::{EmissionCursor, Snapshot};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

/// How answer nodes are told apart across turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStrategy {
    /// By the message id attribute. Snapshots without an id are ignored.
    #[default]
    ById,
    /// By position of the latest answer node.
    ByOrdinal,
    /// One answer region replaced per question. A snapshot still showing the
    /// previous finalized answer is ignored.
    Untracked,
}

/// Identifies one turn under a [`TurnStrategy`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TurnKey {
    Id(String),
    Ordinal(usize),
    Untracked(u64),
}

impl fmt::Display for TurnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Ordinal(n) => write!(f, "#{}", n),
            Self::Untracked(n) => write!(f, "turn {}", n),
        }
    }
}

/// The turn currently being captured.
#[derive(Debug)]
pub struct Turn {
    pub key: TurnKey,
    pub cursor: EmissionCursor,
    last_text: String,
}

impl Turn {
    fn new(key: TurnKey) -> Self {
        Self {
            key,
            cursor: EmissionCursor::new(),
            last_text: String::new(),
        }
    }
}

/// Result of passing a snapshot through the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// No node, or a node that belongs to a finalized turn.
    Ignore,
    /// Another observation of the current turn.
    Current,
    /// The snapshot started a new current turn.
    NewTurn,
}

/// Session-scoped record of which turns were already delivered.
#[derive(Debug, Default)]
pub struct TurnTracker {
    strategy: TurnStrategy,
    finalized: HashSet<TurnKey>,
    current: Option<Turn>,
    retired_text: Option<String>,
    untracked_seq: u64,
}

impl TurnTracker {
    pub fn new(strategy: TurnStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Route `snapshot` to the current turn, starting one if needed.
    ///
    /// Under [`TurnStrategy::Untracked`] the last finished answer is skipped
    /// until the region shows anything else, a blank or missing node
    /// included. After that the same text counts as a new answer.
    pub fn gate(&mut self, snapshot: &Snapshot) -> Gate {
        let text = snapshot.text.trim();
        if self.retired_text.as_deref().is_some_and(|old| old != text) {
            debug!("previous answer left the region");
            self.retired_text = None;
        }

        let Some(key) = self.key_for(snapshot) else {
            return Gate::Ignore;
        };
        if self.finalized.contains(&key) {
            return Gate::Ignore;
        }
        if self.strategy == TurnStrategy::Untracked
            && self.retired_text.as_deref() == Some(text)
        {
            return Gate::Ignore;
        }

        match self.current {
            Some(ref mut turn) if turn.key == key => {
                turn.last_text.clear();
                turn.last_text.push_str(text);
                Gate::Current
            }
            _ => {
                if let Some(ref old) = self.current {
                    debug!("turn {} superseded before completion", old.key);
                }
                debug!("turn {} is now current", key);
                let mut turn = Turn::new(key);
                turn.last_text.push_str(text);
                self.current = Some(turn);
                Gate::NewTurn
            }
        }
    }

    /// Whether `snapshot` belongs to a turn that may still change.
    pub fn is_current_and_unfinalized(&mut self, snapshot: &Snapshot) -> bool {
        self.gate(snapshot) != Gate::Ignore
    }

    pub fn current(&self) -> Option<&Turn> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut Turn> {
        self.current.as_mut()
    }

    /// Mark `key` as delivered. Later snapshots carrying it are ignored.
    pub fn finalize(&mut self, key: TurnKey) {
        if self.current.as_ref().is_some_and(|t| t.key == key) {
            if let Some(turn) = self.current.take() {
                self.retired_text = Some(turn.last_text);
            }
        }
        if let TurnKey::Untracked(_) = key {
            self.untracked_seq += 1;
        }
        info!("turn {} finalized", key);
        self.finalized.insert(key);
    }

    /// Finalize the current turn, returning its key.
    pub fn finalize_current(&mut self) -> Option<TurnKey> {
        let key = self.current.as_ref()?.key.clone();
        self.finalize(key.clone());
        Some(key)
    }

    pub fn is_finalized(&self, key: &TurnKey) -> bool {
        self.finalized.contains(key)
    }

    pub fn finalized(&self) -> &HashSet<TurnKey> {
        &self.finalized
    }

    fn key_for(&self, snapshot: &Snapshot) -> Option<TurnKey> {
        let ordinal = snapshot.ordinal?;
        match self.strategy {
            TurnStrategy::ById => snapshot
                .message_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .map(|id| TurnKey::Id(id.to_string())),
            TurnStrategy::ByOrdinal => Some(TurnKey::Ordinal(ordinal)),
            TurnStrategy::Untracked => Some(TurnKey::Untracked(self.untracked_seq)),
        }
    }
}

//! Page driver abstraction.
//!
//! The capture engine never touches a browser directly. It asks a
//! [`PageDriver`] for the latest answer node, its text, an optional id
//! attribute and whether a busy indicator is on screen. [`EokaDriver`] is the
//! browser-backed implementation; [`ScriptedDriver`] replays canned frames.

mod browser;
mod scripted;

pub use browser::EokaDriver;
pub use scripted::{Frame, ScriptedDriver};

use async_trait::async_trait;

/// Result type for page driver queries.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Errors raised by a page driver.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    NotFound(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),
}

/// Handle to an answer node, identified by its position among the answer
/// nodes currently on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    /// Zero-based index of the node in document order.
    pub ordinal: usize,
}

impl NodeHandle {
    pub fn new(ordinal: usize) -> Self {
        Self { ordinal }
    }
}

/// Text-query and input primitives over a rendered chat surface.
///
/// Implementations must tolerate the page mutating between calls: a handle
/// returned by [`query_latest_answer_node`](PageDriver::query_latest_answer_node)
/// may already be stale when it is read.
#[async_trait]
pub trait PageDriver: Send {
    /// Type `text` into the input surface and submit it.
    async fn submit_question(&mut self, text: &str) -> DriverResult<()>;

    /// The most recently appended answer container, if any.
    async fn query_latest_answer_node(&mut self) -> DriverResult<Option<NodeHandle>>;

    /// Current rendered text of `node`.
    async fn read_text(&mut self, node: &NodeHandle) -> DriverResult<String>;

    /// Read attribute `name` from `node`.
    async fn get_attribute(&mut self, node: &NodeHandle, name: &str)
        -> DriverResult<Option<String>>;

    /// Whether a generation-in-progress marker is present anywhere on the page.
    async fn query_busy_indicator(&mut self) -> DriverResult<bool>;
}

use super::{DriverError, DriverResult, NodeHandle, PageDriver};
use async_trait::async_trait;
use std::collections::VecDeque;

/// One observed state of a scripted page.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Text of the latest answer node, or `None` when no node is rendered.
    pub text: Option<String>,
    /// Value returned for any attribute lookup on the node.
    pub id: Option<String>,
    /// Position of the latest answer node.
    pub ordinal: usize,
    /// Whether the busy indicator is showing.
    pub busy: bool,
    /// Fail the node query with this message instead of answering.
    pub error: Option<String>,
}

impl Frame {
    /// A page with no answer node yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A page whose latest answer node shows `text`.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A frame whose node query fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn at(mut self, ordinal: usize) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn busy(mut self) -> Self {
        self.busy = true;
        self
    }
}

/// A [`PageDriver`] that replays a queue of [`Frame`]s.
///
/// Each call to `query_latest_answer_node` advances to the next frame; the
/// remaining queries of that tick read the same frame. Once the queue runs dry
/// the last frame is repeated forever.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    frames: VecDeque<Frame>,
    current: Frame,
    submitted: Vec<String>,
    polls: usize,
}

impl ScriptedDriver {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Queue more frames behind the ones not yet replayed.
    pub fn push(&mut self, frames: impl IntoIterator<Item = Frame>) {
        self.frames.extend(frames);
    }

    /// Questions passed to `submit_question`, in order.
    pub fn submitted(&self) -> &[String] {
        &self.submitted
    }

    /// Number of node queries served so far.
    pub fn polls(&self) -> usize {
        self.polls
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn submit_question(&mut self, text: &str) -> DriverResult<()> {
        self.submitted.push(text.to_string());
        Ok(())
    }

    async fn query_latest_answer_node(&mut self) -> DriverResult<Option<NodeHandle>> {
        if let Some(next) = self.frames.pop_front() {
            self.current = next;
        }
        self.polls += 1;
        if let Some(ref message) = self.current.error {
            return Err(DriverError::Query(message.clone()));
        }
        Ok(self
            .current
            .text
            .as_ref()
            .map(|_| NodeHandle::new(self.current.ordinal)))
    }

    async fn read_text(&mut self, node: &NodeHandle) -> DriverResult<String> {
        self.current
            .text
            .clone()
            .ok_or_else(|| DriverError::NotFound(format!("answer node {}", node.ordinal)))
    }

    async fn get_attribute(
        &mut self,
        _node: &NodeHandle,
        _name: &str,
    ) -> DriverResult<Option<String>> {
        Ok(self.current.id.clone())
    }

    async fn query_busy_indicator(&mut self) -> DriverResult<bool> {
        Ok(self.current.busy)
    }
}

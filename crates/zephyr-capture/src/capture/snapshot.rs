use crate::driver::{DriverResult, PageDriver};
use tokio::time::Instant;

/// What the answer region looked like on one poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Rendered text of the latest answer node (empty when there is none).
    pub text: String,
    /// Stable message id, when the surface exposes one.
    pub message_id: Option<String>,
    /// Position of the latest answer node, `None` when there is none.
    pub ordinal: Option<usize>,
    /// Whether a busy indicator was present.
    pub busy: bool,
    pub observed_at: Instant,
}

impl Snapshot {
    /// A snapshot taken before any answer node was rendered.
    pub fn empty(busy: bool) -> Self {
        Self {
            text: String::new(),
            message_id: None,
            ordinal: None,
            busy,
            observed_at: Instant::now(),
        }
    }

    pub fn has_node(&self) -> bool {
        self.ordinal.is_some()
    }
}

/// Reads [`Snapshot`]s from a page driver.
#[derive(Debug, Clone, Default)]
pub struct SnapshotReader {
    id_attribute: Option<String>,
}

impl SnapshotReader {
    /// `id_attribute` names the attribute holding a message id; `None` skips
    /// the lookup.
    pub fn new(id_attribute: Option<String>) -> Self {
        Self { id_attribute }
    }

    pub async fn take_snapshot<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
    ) -> DriverResult<Snapshot> {
        let node = driver.query_latest_answer_node().await?;

        let (text, message_id, ordinal) = match node {
            Some(node) => {
                let text = driver.read_text(&node).await?;
                let message_id = match self.id_attribute {
                    Some(ref name) => driver.get_attribute(&node, name).await?,
                    None => None,
                };
                (text, message_id, Some(node.ordinal))
            }
            None => (String::new(), None, None),
        };

        let busy = driver.query_busy_indicator().await?;

        Ok(Snapshot {
            text,
            message_id,
            ordinal,
            busy,
            observed_at: Instant::now(),
        })
    }
}

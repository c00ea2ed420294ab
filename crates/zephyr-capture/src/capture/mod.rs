mod completion;
mod diff;
mod snapshot;
mod turn;

pub use completion::{
    CompletionConfig, CompletionDetector, CompletionState, DEFAULT_INDICATOR_TIMEOUT,
    DEFAULT_STABLE_TICKS,
};
pub use diff::{DiffEmitter, EmissionCursor};
pub use snapshot::{Snapshot, SnapshotReader};
pub use turn::{Gate, Turn, TurnKey, TurnStrategy, TurnTracker};

use crate::driver::PageDriver;
use crate::Result;
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Receives answer text as soon as it appears on the page.
pub trait OutputSink {
    fn emit(&mut self, chunk: &str);
}

/// Writes chunks straight to stdout, flushing after each one.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, chunk: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(chunk.as_bytes());
        let _ = out.flush();
    }
}

impl OutputSink for String {
    fn emit(&mut self, chunk: &str) {
        self.push_str(chunk);
    }
}

impl OutputSink for Vec<String> {
    fn emit(&mut self, chunk: &str) {
        self.push(chunk.to_string());
    }
}

impl<T: OutputSink + ?Sized> OutputSink for &mut T {
    fn emit(&mut self, chunk: &str) {
        (**self).emit(chunk);
    }
}

/// Capture engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Pause between poll ticks.
    pub poll_interval: Duration,
    pub completion: CompletionConfig,
    pub turn: TurnStrategy,
    /// Attribute holding a message id, read on every tick when set.
    pub id_attribute: Option<String>,
    /// Remove a leading echo of the question from the answer.
    pub strip_echo: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            completion: CompletionConfig::default(),
            turn: TurnStrategy::ById,
            id_attribute: Some("id".into()),
            strip_echo: true,
        }
    }
}

impl CaptureConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_completion(mut self, completion: CompletionConfig) -> Self {
        self.completion = completion;
        self
    }

    pub fn with_turn(mut self, turn: TurnStrategy) -> Self {
        self.turn = turn;
        self
    }

    pub fn with_id_attribute(mut self, name: Option<String>) -> Self {
        self.id_attribute = name;
        self
    }
}

/// Outcome of one capture call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    /// Everything emitted for the turn.
    pub text: String,
    /// The reply did not finish within the timeout.
    pub timed_out: bool,
    /// Last driver error, when the final tick failed.
    pub error: Option<String>,
    /// Poll ticks taken.
    pub ticks: u64,
    pub elapsed: Duration,
}

impl CaptureResult {
    pub fn is_complete(&self) -> bool {
        !self.timed_out
    }

    /// Text fit to show or store. Never empty: an unusable capture becomes an
    /// explicit marker, and a partial one is flagged as such.
    pub fn display_text(&self) -> String {
        if !self.timed_out {
            if self.text.is_empty() {
                return "[No response extracted]".to_string();
            }
            return self.text.clone();
        }
        match (self.text.is_empty(), &self.error) {
            (true, Some(err)) => format!("[Error: {}]", err),
            (true, None) => "[Timeout: no response before the time limit]".to_string(),
            (false, _) => format!("{}\n[Timeout: response may be incomplete]", self.text),
        }
    }
}

/// A chat session: one page driver plus the turns already delivered on it.
///
/// Captures run one at a time (`&mut self`). Dropping a capture future part
/// way leaves the current turn unfinalized, so the next capture resumes it.
pub struct Session<D> {
    driver: D,
    reader: SnapshotReader,
    tracker: TurnTracker,
    config: CaptureConfig,
}

impl<D: PageDriver> Session<D> {
    pub fn new(driver: D, config: CaptureConfig) -> Self {
        Self {
            driver,
            reader: SnapshotReader::new(config.id_attribute.clone()),
            tracker: TurnTracker::new(config.turn),
            config,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    pub fn tracker(&self) -> &TurnTracker {
        &self.tracker
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Submit `question` and capture the reply.
    pub async fn ask<S>(&mut self, question: &str, sink: &mut S) -> Result<CaptureResult>
    where
        S: OutputSink + ?Sized,
    {
        info!("submitting question ({} chars)", question.len());
        self.driver.submit_question(question).await?;
        Ok(self.capture(question, sink).await)
    }

    /// Poll the page until the reply to an already submitted `question` is
    /// complete or the timeout runs out. New text goes to `sink` as it shows
    /// up.
    pub async fn capture<S>(&mut self, question: &str, sink: &mut S) -> CaptureResult
    where
        S: OutputSink + ?Sized,
    {
        let start = Instant::now();
        let emitter = DiffEmitter::new(question, self.config.strip_echo);
        let mut detector = CompletionDetector::new(self.config.completion.clone());
        let mut last_error = None;
        let mut ticks = 0;

        loop {
            ticks += 1;
            let state = match self.reader.take_snapshot(&mut self.driver).await {
                Ok(snapshot) => {
                    last_error = None;
                    let elapsed = start.elapsed();
                    self.tick(&snapshot, &emitter, &mut detector, sink, elapsed)
                }
                Err(e) => {
                    warn!("tick {}: page query failed: {}", ticks, e);
                    last_error = Some(e.to_string());
                    detector.check_timeout(start.elapsed())
                }
            };

            match state {
                CompletionState::Done => {
                    let text = self.current_text();
                    self.tracker.finalize_current();
                    info!(
                        "reply complete after {} ticks ({} chars)",
                        ticks,
                        text.len()
                    );
                    return CaptureResult {
                        text,
                        timed_out: false,
                        error: None,
                        ticks,
                        elapsed: start.elapsed(),
                    };
                }
                CompletionState::TimedOut => {
                    let text = self.current_text();
                    warn!(
                        "timed out after {:?} with {} chars captured",
                        start.elapsed(),
                        text.len()
                    );
                    return CaptureResult {
                        text,
                        timed_out: true,
                        error: last_error,
                        ticks,
                        elapsed: start.elapsed(),
                    };
                }
                CompletionState::Streaming | CompletionState::StableCheck => {}
            }

            let pause = match detector.remaining(start.elapsed()) {
                Some(left) => left.min(self.config.poll_interval),
                None => self.config.poll_interval,
            };
            tokio::time::sleep(pause).await;
        }
    }

    fn tick<S>(
        &mut self,
        snapshot: &Snapshot,
        emitter: &DiffEmitter,
        detector: &mut CompletionDetector,
        sink: &mut S,
        elapsed: Duration,
    ) -> CompletionState
    where
        S: OutputSink + ?Sized,
    {
        let gate = self.tracker.gate(snapshot);
        if gate == Gate::Ignore {
            debug!("ignoring snapshot (node {:?})", snapshot.ordinal);
            return detector.check_timeout(elapsed);
        }
        let Some(turn) = self.tracker.current_mut() else {
            return detector.check_timeout(elapsed);
        };

        let new_text = emitter.emit(&mut turn.cursor, snapshot);
        if !new_text.is_empty() {
            sink.emit(&new_text);
        }

        detector.observe(emitter.normalize(&snapshot.text), snapshot.busy, elapsed)
    }

    fn current_text(&self) -> String {
        self.tracker
            .current()
            .map(|t| t.cursor.printed().to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Frame, ScriptedDriver};

    fn stability_session(frames: Vec<Frame>) -> Session<ScriptedDriver> {
        let config = CaptureConfig::default()
            .with_poll_interval(Duration::from_millis(500))
            .with_completion(
                CompletionConfig::stability().with_timeout(Some(Duration::from_secs(30))),
            );
        Session::new(ScriptedDriver::new(frames), config)
    }

    fn indicator_session(frames: Vec<Frame>) -> Session<ScriptedDriver> {
        let config = CaptureConfig::default()
            .with_poll_interval(Duration::from_millis(500))
            .with_completion(CompletionConfig::indicator());
        Session::new(ScriptedDriver::new(frames), config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_and_finishes_on_stability() {
        let mut session = stability_session(vec![
            Frame::empty(),
            Frame::text("Hel").with_id("m1"),
            Frame::text("Hello").with_id("m1"),
            Frame::text("Hello world.").with_id("m1"),
        ]);
        let mut chunks: Vec<String> = Vec::new();

        let result = session.capture("greet me", &mut chunks).await;

        assert!(result.is_complete());
        assert_eq!(result.text, "Hello world.");
        assert_eq!(chunks, ["Hel", "lo", " world."]);
        // 1 empty + 3 growing + 2 more identical ticks.
        assert_eq!(result.ticks, 6);
        assert!(session.tracker().is_finalized(&TurnKey::Id("m1".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_indicator_finishes_when_busy_clears() {
        let mut session = indicator_session(vec![
            Frame::empty().busy(),
            Frame::text("4").with_id("m1").busy(),
            Frame::text("4, because").with_id("m1").busy(),
            Frame::text("4, because 2+2=4.").with_id("m1"),
        ]);
        let mut out = String::new();

        let result = session.capture("What is 2+2?", &mut out).await;

        assert!(!result.timed_out);
        assert_eq!(result.ticks, 4);
        assert_eq!(out, "4, because 2+2=4.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_partial_text() {
        let mut frames = Vec::new();
        for i in 0..400 {
            frames.push(Frame::text("x".repeat(i + 1)).with_id("m1").busy());
        }
        let mut session = indicator_session(frames);
        let mut out = String::new();

        let start = Instant::now();
        let result = session.capture("q", &mut out).await;

        assert!(result.timed_out);
        assert_eq!(result.text, out);
        assert!(!result.text.is_empty());
        assert!(start.elapsed() >= DEFAULT_INDICATOR_TIMEOUT);
        assert!(session.tracker().finalized().is_empty());
        assert!(result.display_text().ends_with("[Timeout: response may be incomplete]"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_pause_is_cut_to_the_timeout() {
        let config = CaptureConfig::default()
            .with_poll_interval(Duration::from_secs(2))
            .with_completion(
                CompletionConfig::indicator().with_timeout(Some(Duration::from_secs(5))),
            );
        let mut session = Session::new(
            ScriptedDriver::new([Frame::text("working").with_id("m1").busy()]),
            config,
        );
        let mut out = String::new();

        let result = session.capture("q", &mut out).await;

        assert!(result.timed_out);
        // Ticks at 0s, 2s, 4s and 5s.
        assert_eq!(result.ticks, 4);
        assert!(result.elapsed >= Duration::from_secs(5));
        assert!(result.elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_errors_are_retried() {
        let mut session = stability_session(vec![
            Frame::failing("node detached"),
            Frame::text("ok").with_id("m1"),
            Frame::failing("node detached"),
            Frame::text("ok").with_id("m1"),
        ]);
        let mut out = String::new();

        let result = session.capture("q", &mut out).await;

        assert!(result.is_complete());
        assert_eq!(result.text, "ok");
        assert_eq!(result.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_driver_failure_times_out_with_error() {
        let mut session = stability_session(vec![Frame::failing("browser gone")]);
        let mut out = String::new();

        let result = session.capture("q", &mut out).await;

        assert!(result.timed_out);
        assert_eq!(result.text, "");
        assert_eq!(
            result.display_text(),
            "[Error: query failed: browser gone]"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ask_submits_then_captures() {
        let mut session = stability_session(vec![Frame::text("Sure.").with_id("m1")]);
        let mut out = String::new();

        let result = session.ask("Can you help?", &mut out).await.unwrap();

        assert_eq!(session.driver().submitted(), ["Can you help?"]);
        assert_eq!(result.text, "Sure.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_capture_resumes_same_turn() {
        let mut session = indicator_session(vec![
            Frame::text("Once upon").with_id("m1").busy(),
            Frame::text("Once upon a time").with_id("m1").busy(),
        ]);
        let mut out = String::new();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(700),
            session.capture("story", &mut out),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(session.tracker().finalized().is_empty());
        assert_eq!(out, "Once upon a time");

        session
            .driver_mut()
            .push([Frame::text("Once upon a time, the end.").with_id("m1")]);
        let result = session.capture("story", &mut out).await;

        assert_eq!(result.text, "Once upon a time, the end.");
        assert_eq!(out, "Once upon a time, the end.");
    }

    #[test]
    fn test_display_text_markers() {
        let mut result = CaptureResult {
            text: String::new(),
            timed_out: true,
            error: None,
            ticks: 3,
            elapsed: Duration::from_secs(1),
        };
        assert!(result.display_text().starts_with("[Timeout"));

        result.timed_out = false;
        assert_eq!(result.display_text(), "[No response extracted]");

        result.text = "fine".into();
        assert_eq!(result.display_text(), "fine");
    }
}

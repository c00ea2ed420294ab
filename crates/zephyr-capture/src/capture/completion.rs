use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Default stability threshold, in ticks.
pub const DEFAULT_STABLE_TICKS: u32 = 3;

/// Default timeout for sites with a busy indicator.
pub const DEFAULT_INDICATOR_TIMEOUT: Duration = Duration::from_secs(120);

/// Where a capture stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// Text is still changing.
    Streaming,
    /// Text repeated at least once; counting towards the threshold.
    StableCheck,
    /// Generation finished.
    Done,
    /// Gave up before the reply finished.
    TimedOut,
}

impl CompletionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::TimedOut)
    }
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streaming => write!(f, "streaming"),
            Self::StableCheck => write!(f, "stable-check"),
            Self::Done => write!(f, "done"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Which completion signals apply and how long to wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionConfig {
    /// The surface renders a busy indicator while generating. When set, its
    /// disappearance ends the capture and the stability rule is not used.
    pub busy_indicator: bool,
    /// Consecutive ticks that must show the same text, the first included.
    pub stable_ticks: u32,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl CompletionConfig {
    /// Busy-indicator detection with the default 120s timeout.
    pub fn indicator() -> Self {
        Self {
            busy_indicator: true,
            stable_ticks: DEFAULT_STABLE_TICKS,
            timeout: Some(DEFAULT_INDICATOR_TIMEOUT),
        }
    }

    /// Stability detection with no timeout.
    pub fn stability() -> Self {
        Self {
            busy_indicator: false,
            stable_ticks: DEFAULT_STABLE_TICKS,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stable_ticks(mut self, ticks: u32) -> Self {
        self.stable_ticks = ticks;
        self
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self::stability()
    }
}

/// Decides from successive observations whether a reply has finished.
///
/// One detector serves one capture call and is discarded afterwards.
#[derive(Debug)]
pub struct CompletionDetector {
    config: CompletionConfig,
    state: CompletionState,
    last_text: String,
    stable_run: u32,
}

impl CompletionDetector {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            config,
            state: CompletionState::Streaming,
            last_text: String::new(),
            stable_run: 0,
        }
    }

    pub fn state(&self) -> CompletionState {
        self.state
    }

    /// Consecutive repeats of the current text.
    pub fn stable_run(&self) -> u32 {
        self.stable_run
    }

    /// Feed one tick's current-turn text and busy state.
    pub fn observe(&mut self, text: &str, busy: bool, elapsed: Duration) -> CompletionState {
        if self.state.is_terminal() {
            return self.state;
        }

        if text == self.last_text {
            self.stable_run += 1;
        } else {
            self.stable_run = 0;
            self.last_text.clear();
            self.last_text.push_str(text);
        }

        self.state = if text.is_empty() {
            CompletionState::Streaming
        } else if self.config.busy_indicator {
            if busy {
                self.stable_state()
            } else {
                CompletionState::Done
            }
        } else if self.stable_run + 1 >= self.config.stable_ticks {
            CompletionState::Done
        } else {
            self.stable_state()
        };

        debug!(
            "completion: {} (run {}, busy {}, {} chars)",
            self.state,
            self.stable_run,
            busy,
            text.len()
        );

        if self.state != CompletionState::Done {
            self.check_timeout(elapsed);
        }
        self.state
    }

    /// Time out if the budget is spent. Used on ticks that produced no
    /// observation.
    pub fn check_timeout(&mut self, elapsed: Duration) -> CompletionState {
        if self.state.is_terminal() {
            return self.state;
        }
        if let Some(timeout) = self.config.timeout {
            if elapsed >= timeout {
                self.state = CompletionState::TimedOut;
            }
        }
        self.state
    }

    /// Time left before the timeout, `None` when unbounded.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.config.timeout.map(|t| t.saturating_sub(elapsed))
    }

    fn stable_state(&self) -> CompletionState {
        if self.stable_run > 0 {
            CompletionState::StableCheck
        } else {
            CompletionState::Streaming
        }
    }
}

//! # zephyr-capture
//!
//! Incremental response capture for chat-style web front-ends. Submit a
//! question through a headless browser, then poll the rendered answer region,
//! stream the new text as it appears and decide when the reply is finished.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zephyr_capture::{Config, EokaDriver, Session, StdoutSink};
//!
//! # #[tokio::main]
//! # async fn main() -> zephyr_capture::Result<()> {
//! let config = Config::builtin("deep")?;
//! let driver = EokaDriver::launch(&config).await?;
//! let mut session = Session::new(driver, config.capture_config());
//!
//! let result = session.ask("What is 2+2?", &mut StdoutSink).await?;
//! println!("\n{}", if result.timed_out { "(incomplete)" } else { "(done)" });
//!
//! session.into_driver().close().await?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod driver;

pub use capture::{
    CaptureConfig, CaptureResult, CompletionConfig, CompletionState, OutputSink, Session,
    StdoutSink, TurnKey, TurnStrategy,
};
pub use config::{BrowserConfig, Config, Selectors, BUILTIN_PROFILES};
pub use driver::{DriverError, EokaDriver, Frame, NodeHandle, PageDriver, ScriptedDriver};

/// Result type for zephyr-capture operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading a profile or driving a page.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_minimal_profile() {
        let yaml = r##"
name: "Test"
url: "https://example.com/chat"
selectors:
  input: "#prompt"
  answer: ".reply"
  id_attribute: "data-id"
"##;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.name, "Test");
        assert_eq!(config.url, "https://example.com/chat");
        assert!(config.browser.headless);
        assert!(config.preflight.is_empty());
        assert_eq!(config.selectors.submit, None);
        assert_eq!(config.selectors.input_timeout_ms, 20_000);
        assert_eq!(config.capture.poll_interval_ms, 1000);
        assert_eq!(config.capture.stable_ticks, 3);
        assert_eq!(config.capture.turn, TurnStrategy::ById);
        assert!(config.capture.strip_echo);
    }

    #[test]
    fn test_capture_config_stability_defaults() {
        let yaml = r##"
name: "Test"
url: "https://example.com"
selectors:
  input: "#prompt"
  answer: ".reply"
  id_attribute: "id"
"##;
        let capture = Config::parse(yaml).unwrap().capture_config();
        assert!(!capture.completion.busy_indicator);
        assert_eq!(capture.completion.timeout, None);
        assert_eq!(capture.completion.stable_ticks, 3);
        assert_eq!(capture.poll_interval, Duration::from_secs(1));
        assert_eq!(capture.id_attribute.as_deref(), Some("id"));
    }

    #[test]
    fn test_capture_config_indicator_defaults() {
        let yaml = r##"
name: "Test"
url: "https://example.com"
selectors:
  input: "#prompt"
  answer: ".reply"
  busy: ".spinner"
capture:
  turn: by_ordinal
  poll_interval_ms: 250
"##;
        let capture = Config::parse(yaml).unwrap().capture_config();
        assert!(capture.completion.busy_indicator);
        assert_eq!(capture.completion.timeout, Some(Duration::from_secs(120)));
        assert_eq!(capture.turn, TurnStrategy::ByOrdinal);
        assert_eq!(capture.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_zero_timeout_means_unbounded() {
        let yaml = r##"
name: "Test"
url: "https://example.com"
selectors:
  input: "#prompt"
  answer: ".reply"
  busy: ".spinner"
capture:
  turn: untracked
  timeout_ms: 0
"##;
        let capture = Config::parse(yaml).unwrap().capture_config();
        assert_eq!(capture.completion.timeout, None);
    }

    #[test]
    fn test_parse_browser_config() {
        let yaml = r##"
name: "Test"
url: "https://example.com"
browser:
  headless: false
  proxy: "http://localhost:8080"
  user_agent: "Custom UA"
  viewport:
    width: 1280
    height: 720
selectors:
  input: "#prompt"
  answer: ".reply"
capture:
  turn: by_ordinal
"##;
        let config = Config::parse(yaml).unwrap();
        assert!(!config.browser.headless);
        assert_eq!(config.browser.proxy, Some("http://localhost:8080".into()));
        assert_eq!(config.browser.user_agent, Some("Custom UA".into()));
        let viewport = config.browser.viewport.unwrap();
        assert_eq!(viewport.width, 1280);
        assert_eq!(viewport.height, 720);
    }

    #[test]
    fn test_validation_missing_name() {
        let yaml = r##"
url: "https://example.com"
selectors:
  input: "#prompt"
  answer: ".reply"
"##;
        assert!(Config::parse(yaml).is_err());
    }

    #[test]
    fn test_validation_empty_answer_selector() {
        let yaml = r##"
name: "Test"
url: "https://example.com"
selectors:
  input: "#prompt"
  answer: ""
capture:
  turn: by_ordinal
"##;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("selectors.answer"));
    }

    #[test]
    fn test_validation_by_id_needs_attribute() {
        let yaml = r##"
name: "Test"
url: "https://example.com"
selectors:
  input: "#prompt"
  answer: ".reply"
"##;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("id_attribute"));
    }

    #[test]
    fn test_validation_zero_stable_ticks() {
        let yaml = r##"
name: "Test"
url: "https://example.com"
selectors:
  input: "#prompt"
  answer: ".reply"
capture:
  turn: by_ordinal
  stable_ticks: 0
"##;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_unknown_turn_strategy_rejected() {
        let yaml = r##"
name: "Test"
url: "https://example.com"
selectors:
  input: "#prompt"
  answer: ".reply"
capture:
  turn: by_position
"##;
        assert!(matches!(Config::parse(yaml), Err(Error::Yaml(_))));
    }

    #[test]
    fn test_builtin_profiles_parse() {
        for (name, _) in BUILTIN_PROFILES {
            let config = Config::builtin(name).unwrap();
            assert!(!config.name.is_empty(), "profile {}", name);
        }
    }

    #[test]
    fn test_builtin_zchat_uses_indicator() {
        let config = Config::builtin("zchat").unwrap();
        let capture = config.capture_config();
        assert!(capture.completion.busy_indicator);
        assert_eq!(capture.poll_interval, Duration::from_millis(500));
        assert_eq!(capture.completion.timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.preflight.len(), 1);
        assert_eq!(config.selectors.answer_text.as_deref(), Some(".chat-assistant"));
    }

    #[test]
    fn test_builtin_deep_uses_stability() {
        let capture = Config::builtin("deep").unwrap().capture_config();
        assert!(!capture.completion.busy_indicator);
        assert_eq!(capture.completion.timeout, None);
        assert_eq!(capture.turn, TurnStrategy::ById);
    }

    #[test]
    fn test_unknown_builtin() {
        let err = Config::builtin("nope").unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("profiles/does-not-exist.yaml"),
            Err(Error::Io(_))
        ));
    }
}

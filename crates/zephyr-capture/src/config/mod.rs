pub mod schema;

pub use schema::{BrowserConfig, CaptureSettings, Config, Selectors, Viewport, BUILTIN_PROFILES};

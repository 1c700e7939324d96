pub mod config;
pub mod dedup;
pub mod error;
pub mod poller;
pub mod presentation;
pub mod relay;
pub mod scheduler;
pub mod scroll;
pub mod session;
pub mod source;
pub mod store;
pub mod timeline;
pub mod types;

#[cfg(feature = "dioxus")]
pub mod ui;
#[cfg(feature = "dioxus")]
pub mod views;

pub use config::{AppConfig, SessionSettings, Timings};
pub use error::{ConfigError, FetchError, RelayError, SendRejected};
pub use session::{ChatSession, ChatSnapshot};

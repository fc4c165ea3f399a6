pub mod config;
pub mod error;
pub mod genie;
pub mod http;
pub mod models;
pub mod router;
pub mod service;
pub mod session;
pub mod transport;

pub use config::Config;
pub use error::{GenieChatError, Result};
pub use service::GenieChatService;

pub mod app;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod registry;
pub mod routes;
pub mod server;
pub mod session;
pub mod state;
pub mod stats;

pub use app::{App, start_app};
pub use config::{Config, ConfigError, get_configuration};
pub use dispatcher::Dispatcher;
pub use error::{ProtocolViolation, SessionError};
pub use registry::SessionRegistry;
pub use session::Session;

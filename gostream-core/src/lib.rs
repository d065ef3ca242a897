//! Service orchestration for the GoStream desktop shell
//!
//! Supervises the media engine, the edge HTTP server and the tunnel client,
//! and talks to the GUI through the [`Shell`] trait.

pub mod bootstrap;
pub mod config;
pub mod controller;
pub mod edge;
pub mod error;
pub mod events;
pub mod logging;
pub mod media;
pub mod state;
pub mod stream_key;
pub mod tunnel;

pub use config::Config;
pub use controller::Controller;
pub use error::{Error, Result};
pub use events::{Notice, NoticeLevel, Prompt, ServiceEvent, ServiceStatus, Shell};
pub use media::{LocalEngine, MediaEngine, SubServerKind};
pub use state::{Service, ServiceState};
pub use tunnel::{FrpcClient, TunnelClient, TunnelOutcome};

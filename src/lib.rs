pub mod bot;
pub mod clip;
pub mod config;
pub mod error;
pub mod extract;
pub mod session;
pub mod transport;
pub mod upload;
pub mod worker;

pub use bot::{Bot, SessionLanes};
pub use clip::{parse_range, parse_time, plan, Window};
pub use config::{Config, Limits};
pub use error::{ClipbotError, Result};
pub use session::{InteractionRouter, Selection, SessionKey};
pub use worker::{ClipJob, ExtractionWorker, RunSupervisor, WorkerSettings};

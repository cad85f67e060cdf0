//! Shared building blocks for the Lucida connectors: listen/config parsing,
//! process exit statuses, the keyed session store and the step sequencer.

pub mod config;
pub mod error;
pub mod exit;
pub mod sequencer;
pub mod store;

pub use error::{LucidaError, Result};
pub use exit::ExitStatus;
pub use sequencer::{Outcome, Sequencer, SequencerOptions, Stage, StageOutcome};
pub use store::{MemoryStore, SessionStore};

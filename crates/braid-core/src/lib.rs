pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod types;
pub mod vertex;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ConsensusConfig;
pub use constants::*;
pub use error::ConsensusError;
pub use types::*;
pub use vertex::*;

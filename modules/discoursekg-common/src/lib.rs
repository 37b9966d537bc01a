pub mod artifacts;
pub mod categorize;
pub mod config;
pub mod error;
pub mod speakers;
pub mod types;
pub mod util;

pub use artifacts::*;
pub use categorize::*;
pub use config::Config;
pub use error::DiscourseKgError;
pub use speakers::{Industry, Speaker, SpeakerRegistry};
pub use types::*;

pub mod builder;
pub mod client;
pub mod stage;
pub mod writer;

pub use builder::{assemble, canonical_key, GraphPayload};
pub use client::GraphClient;
pub use stage::GraphStage;
pub use writer::GraphWriter;

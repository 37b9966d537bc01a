pub mod processor;
pub mod report;
pub mod runtime;

pub use processor::{
    Discoverer, DiscoveryRequest, PriorArtifacts, StageFailure, StageOutput, StageProcessor,
};
pub use report::{ItemOutcome, StageReport};
pub use runtime::{PipelineRuntime, RuntimeOptions};

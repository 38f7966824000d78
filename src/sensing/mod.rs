pub mod controller;
pub mod daily_import;
pub mod loop_worker;
pub mod sampler;

pub use controller::SamplerController;
pub use daily_import::UsageImporter;
pub use sampler::{ForegroundSampler, SampleOutcome};

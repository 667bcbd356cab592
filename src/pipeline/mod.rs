// Research pipeline: one task through produce, compress and verify

pub mod research;

pub use research::{DEFAULT_DEADLINE_MS, PipelineConfig, ResearchPipeline};

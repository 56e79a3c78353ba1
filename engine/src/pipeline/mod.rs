//! Parallel segment pipeline (spec §4.4).

mod segment_pipeline;

pub use segment_pipeline::{
    run, PipelineInput, PipelineOutput, ProgressCallback, SegmentCompleteCallback,
};

//! Reel Color - pipeline planning, tone mapping and CPU scaling.

pub mod color_space;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod scale;
pub mod tonemapping;
pub mod transfer;

pub use color_space::{convert_3x3, Gamut, YCbCrMatrix};
pub use error::ColorError;
pub use pipeline::{ColorOp, ColorPipeline, PlanExecutor};
pub use plan::{
    ColorPipelinePlanner, PipelinePlan, PlanFlags, ScaleParams, SourceCharacteristics,
    ToneMapParams, NOMINAL_PEAK_NITS,
};
pub use scale::{DitherMode, PlaneSet, Resampler, SamplePlane, ScaleKernel, Scaler};
pub use tonemapping::ToneMapOperator;
pub use transfer::TransferFunction;

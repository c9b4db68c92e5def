// Domain layer - series model and the growth prediction engine
pub mod channel;
pub mod downsample;
pub mod error;
pub mod fit;
pub mod log_series;
pub mod pipeline;
pub mod prediction;
pub mod series;
pub mod transform;

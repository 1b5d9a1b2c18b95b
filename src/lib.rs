//! easy-fcdr - correlation structure for AVHRR easy-FCDR products
//!
//! Builds the per-effect correlation, uncertainty and sensitivity tensors for
//! one orbit segment, masks unusable scanlines, propagates the tensors through
//! a correlation engine for the visible, infra-red structured and infra-red
//! common channel partitions, and merges the three results into full-sensor
//! channel correlation matrices and correlation-length profiles.

pub mod channels;
pub mod config;
pub mod effects;
pub mod engine;
pub mod gather;
pub mod ingest;
pub mod masking;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod record;
pub mod split;
pub mod synthetic;
pub mod tensors;

use thiserror::Error;

pub use channels::{ChannelCase, ChannelConfiguration, ChannelSubset, Sensor, SensorFamily};
pub use config::ProcessingConfig;
pub use effects::{Effect, EffectCategory};
pub use engine::{CorrelationEngine, EngineInput, EngineOutput, PropagationEngine};
pub use ingest::cleanse;
pub use masking::RepairReport;
pub use merge::{merge_runs, MergedCorrelation, RunResult};
pub use pipeline::{process_orbit, SegmentProduct};
pub use record::{DerivativeKind, Field, MeasurementRecord, RawOrbit, SensorConstants};
pub use split::{split_orbit, Segment, SplitMode};
pub use tensors::{build_tensors, EffectTensors};

/// Number of channel slots in every merged product (Ch1, Ch2, Ch3a, Ch3b, Ch4, Ch5).
pub const SENSOR_CHANNELS: usize = 6;

/// Values at or below this are fill values from the upstream reader.
pub const FILL_THRESHOLD: f64 = -1.0e20;

#[derive(Debug, Error)]
pub enum FcdrError {
    #[error("no scanline with a valid timestamp in the orbit")]
    NoUsableData,
    #[error("unknown sensor identifier: {0}")]
    UnknownSensor(String),
    #[error("no product platform code for sensor: {0}")]
    UnknownPlatform(String),
    #[error("channel {channel} out of range for {case}")]
    ChannelOutOfRange { channel: usize, case: ChannelCase },
    #[error("channel {channel} has no {kind:?} derivative")]
    NoDerivative {
        channel: usize,
        kind: DerivativeKind,
    },
    #[error("missing input field: {0}")]
    MissingField(String),
    #[error("{context} shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

//! Error types for the renderer.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;
use crate::resources::cubemap::CubemapStage;
use crate::shader::{ShaderStage, UniformType};

/// Errors raised while compiling, linking or feeding a shader program.
#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("{path}: cannot infer a shader stage from the file extension")]
    UnknownExtension { path: String },

    #[error("{path}: {stage} shaders are not supported by this backend")]
    UnsupportedStage { path: String, stage: &'static str },

    #[error("failed to read shader {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} shader {path} failed to compile:\n{message}")]
    Compile {
        path: String,
        stage: ShaderStage,
        message: String,
    },

    #[error("{stage} shader {path} failed validation: {message}")]
    Validation {
        path: String,
        stage: ShaderStage,
        message: String,
    },

    #[error("{path}: no {stage} entry point")]
    MissingEntryPoint { path: String, stage: ShaderStage },

    #[error("program {program} failed to link: {message}")]
    Link { program: String, message: String },

    #[error("program {program}: no active uniform named `{name}`")]
    UnknownUniform { program: String, name: String },

    #[error("program {program}: uniform `{name}` is {expected:?}, cannot assign {found}")]
    TypeMismatch {
        program: String,
        name: String,
        expected: UniformType,
        found: &'static str,
    },

    #[error("program {program}: no texture binding named `{name}`")]
    UnknownSampler { program: String, name: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error("buffer {label}: write of {requested} bytes at offset {offset} exceeds {capacity} bytes")]
    BufferOverflow {
        label: String,
        offset: u64,
        requested: u64,
        capacity: u64,
    },

    #[error("buffer {label}: expected {expected} elements, got {found}")]
    ElementCountMismatch {
        label: String,
        expected: usize,
        found: usize,
    },

    #[error("render target {label} is not complete: {reason}")]
    IncompleteTarget { label: String, reason: String },

    #[error("render target {label} has no color attachment {index}")]
    MissingAttachment { label: String, index: usize },

    #[error("cubemap {operation} requires stage {required:?}, current stage is {current:?}")]
    InvalidCubemapStage {
        operation: &'static str,
        required: CubemapStage,
        current: CubemapStage,
    },

    #[error("failed to load {}: {source}", path.display())]
    Asset {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{requested} point lights requested, at most {max} are supported")]
    TooManyPointLights { requested: usize, max: usize },

    #[error("renderer was built for {expected} point lights, scene has {found}")]
    PointLightCountMismatch { expected: usize, found: usize },

    #[error("uniform ring exhausted: {requested} bytes requested, capacity {capacity}")]
    UniformRingExhausted { requested: u64, capacity: u64 },

    #[error("invalid frame schedule: {0}")]
    Schedule(String),
}

pub type RenderResult<T> = Result<T, RenderError>;

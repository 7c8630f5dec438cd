//! Shader programs: WGSL compilation through naga, reflection, linking and
//! the by-name uniform interface.

mod library;
mod program;
mod reflect;
mod uniform;

pub use library::{names as builtin_names, source as builtin_source};
pub use program::{BindingKind, ProgramId, ResourceBinding, ShaderProgram, UniformBlock, UniformLocation};
pub use reflect::UniformField;
pub use uniform::{UniformType, UniformValue};

use std::fmt;

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

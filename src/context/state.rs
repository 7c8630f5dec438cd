//! Fixed-function state shared by every pass.

use crate::backend::{BlendState, CompareFunction, CullMode, PrimitiveTopology};

/// Toggleable pieces of pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    DepthTest,
    DepthWrite,
    CullFace,
    Blend,
    /// Encode linear color to sRGB when writing the display target
    FramebufferSrgb,
}

/// Pipeline state the next draw is resolved against.
///
/// Passes share one mutable instance inside [`GpuContext`](super::GpuContext),
/// so every pass sets what it depends on before drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub cull_mode: CullMode,
    pub blend: Option<BlendState>,
    pub srgb: bool,
    pub topology: PrimitiveTopology,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: true,
            depth_compare: CompareFunction::Less,
            cull_mode: CullMode::None,
            blend: None,
            srgb: false,
            topology: PrimitiveTopology::TriangleList,
        }
    }
}

impl PipelineState {
    /// Depth tested, depth written, back faces culled.
    pub fn opaque() -> Self {
        Self {
            depth_test: true,
            cull_mode: CullMode::Back,
            ..Default::default()
        }
    }

    /// No depth, no culling. Used by every screen-space pass.
    pub fn fullscreen() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            ..Default::default()
        }
    }

    pub fn set(&mut self, capability: Capability, enabled: bool) {
        match capability {
            Capability::DepthTest => self.depth_test = enabled,
            Capability::DepthWrite => self.depth_write = enabled,
            Capability::CullFace => {
                self.cull_mode = if enabled { CullMode::Back } else { CullMode::None }
            }
            Capability::Blend => {
                self.blend = if enabled {
                    Some(self.blend.unwrap_or(BlendState::ALPHA_BLENDING))
                } else {
                    None
                }
            }
            Capability::FramebufferSrgb => self.srgb = enabled,
        }
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        match capability {
            Capability::DepthTest => self.depth_test,
            Capability::DepthWrite => self.depth_write,
            Capability::CullFace => self.cull_mode != CullMode::None,
            Capability::Blend => self.blend.is_some(),
            Capability::FramebufferSrgb => self.srgb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_toggle() {
        let mut state = PipelineState::default();
        for capability in [
            Capability::DepthTest,
            Capability::CullFace,
            Capability::Blend,
            Capability::FramebufferSrgb,
        ] {
            assert!(!state.is_enabled(capability));
            state.set(capability, true);
            assert!(state.is_enabled(capability));
            state.set(capability, false);
            assert!(!state.is_enabled(capability));
        }
    }

    #[test]
    fn test_blend_keeps_custom_function() {
        let mut state = PipelineState {
            blend: Some(BlendState::ADDITIVE),
            ..Default::default()
        };
        state.set(Capability::Blend, true);
        assert_eq!(state.blend, Some(BlendState::ADDITIVE));
    }

    #[test]
    fn test_presets() {
        assert!(PipelineState::opaque().depth_test);
        assert_eq!(PipelineState::opaque().cull_mode, CullMode::Back);
        assert!(!PipelineState::fullscreen().depth_test);
        assert!(!PipelineState::fullscreen().srgb);
    }
}

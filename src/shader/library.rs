//! Built-in WGSL sources, embedded at compile time.
//!
//! Names carry the `.vert` / `.frag` extension so built-in programs go through
//! the same stage inference as programs loaded from disk.

use std::io;

use crate::error::ShaderError;

const SOURCES: &[(&str, &str)] = &[
    ("fullscreen.vert", include_str!("../shaders/fullscreen.vert")),
    ("shadow_depth.vert", include_str!("../shaders/shadow_depth.vert")),
    ("shadow_depth.frag", include_str!("../shaders/shadow_depth.frag")),
    ("point_shadow.vert", include_str!("../shaders/point_shadow.vert")),
    ("point_shadow.frag", include_str!("../shaders/point_shadow.frag")),
    ("gbuffer.vert", include_str!("../shaders/gbuffer.vert")),
    ("gbuffer.frag", include_str!("../shaders/gbuffer.frag")),
    ("lighting.frag", include_str!("../shaders/lighting.frag")),
    ("skybox.vert", include_str!("../shaders/skybox.vert")),
    ("skybox.frag", include_str!("../shaders/skybox.frag")),
    ("cubemap.vert", include_str!("../shaders/cubemap.vert")),
    ("equirect_to_cube.frag", include_str!("../shaders/equirect_to_cube.frag")),
    ("cube_copy.frag", include_str!("../shaders/cube_copy.frag")),
    ("irradiance.frag", include_str!("../shaders/irradiance.frag")),
    ("prefilter.frag", include_str!("../shaders/prefilter.frag")),
    ("brdf.vert", include_str!("../shaders/brdf.vert")),
    ("brdf.frag", include_str!("../shaders/brdf.frag")),
    ("blur.frag", include_str!("../shaders/blur.frag")),
    ("post.frag", include_str!("../shaders/post.frag")),
];

/// Look up a built-in shader by file name.
pub fn source(name: &str) -> Result<&'static str, ShaderError> {
    SOURCES
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, source)| *source)
        .ok_or_else(|| ShaderError::Io {
            path: name.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no built-in shader with this name"),
        })
}

/// Names of every built-in shader stage.
pub fn names() -> impl Iterator<Item = &'static str> {
    SOURCES.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(source("lighting.frag").unwrap().contains("fs_main"));
        assert!(matches!(source("missing.frag"), Err(ShaderError::Io { .. })));
        assert_eq!(names().count(), SOURCES.len());
    }
}

//! Offscreen render targets.
//!
//! A [`RenderTarget`] owns its color textures and depth buffer. Color outputs can
//! be swapped for a single face of an external texture, which is how one capture
//! target renders every face and mip of the IBL cube maps.

use crate::backend::{GraphicsBackend, TextureFormat, TextureViewHandle};
use crate::context::{AttachmentView, DrawTarget, GpuContext, TargetBinding};
use crate::error::{RenderError, RenderResult};
use crate::resources::texture::Texture;

/// Which binding points a target is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    Read,
    Draw,
    Both,
}

/// A view rendered into, with the size of the subresource it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attachment {
    view: AttachmentView,
    width: u32,
    height: u32,
}

impl Attachment {
    fn of(texture: &Texture, view: TextureViewHandle, width: u32, height: u32) -> Self {
        Self {
            view: AttachmentView {
                texture: texture.handle(),
                view,
                format: texture.format(),
            },
            width,
            height,
        }
    }
}

#[derive(Debug)]
pub struct RenderTarget {
    label: String,
    colors: Vec<Texture>,
    color_views: Vec<Attachment>,
    depth: Option<Texture>,
    depth_view: Option<Attachment>,
}

impl RenderTarget {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            colors: Vec::new(),
            color_views: Vec::new(),
            depth: None,
            depth_view: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Use `textures` as ordered color outputs `0..N`.
    pub fn attach_color_targets(&mut self, textures: Vec<Texture>) {
        self.color_views = textures
            .iter()
            .map(|t| Attachment::of(t, t.view(), t.width(), t.height()))
            .collect();
        self.colors = textures;
    }

    /// Render into one layer and mip of `texture` instead of the owned colors.
    pub fn attach_color_face(&mut self, texture: &Texture, layer: u32, mip: u32) -> RenderResult<()> {
        let view = texture.face_view(layer, mip).ok_or_else(|| RenderError::IncompleteTarget {
            label: self.label.clone(),
            reason: format!("{} has no layer {} mip {}", texture.label(), layer, mip),
        })?;
        let width = (texture.width() >> mip).max(1);
        let height = (texture.height() >> mip).max(1);
        self.color_views = vec![Attachment::of(texture, view, width, height)];
        Ok(())
    }

    /// Render depth into one layer of a layered depth texture.
    pub fn attach_depth_face(&mut self, texture: &Texture, layer: u32) -> RenderResult<()> {
        let view = texture.face_view(layer, 0).ok_or_else(|| RenderError::IncompleteTarget {
            label: self.label.clone(),
            reason: format!("{} has no layer {}", texture.label(), layer),
        })?;
        self.depth_view = Some(Attachment::of(texture, view, texture.width(), texture.height()));
        Ok(())
    }

    /// Create an owned depth buffer of the given size.
    pub fn attach_depth_buffer<B: GraphicsBackend>(
        &mut self,
        ctx: &mut GpuContext<B>,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        let depth = Texture::depth(ctx, &format!("{} Depth", self.label), width, height)?;
        self.depth_view = Some(Attachment::of(&depth, depth.view(), width, height));
        self.depth = Some(depth);
        Ok(())
    }

    /// Reallocate the depth buffer. Color attachments are left alone.
    pub fn resize<B: GraphicsBackend>(&mut self, ctx: &mut GpuContext<B>, width: u32, height: u32) -> RenderResult<()> {
        if self.depth_size() == Some((width, height)) {
            return Ok(());
        }
        log::trace!("Resizing depth of '{}' to {}x{}", self.label, width, height);
        self.attach_depth_buffer(ctx, width, height)
    }

    /// Check the target can be drawn into.
    pub fn is_complete(&self) -> RenderResult<()> {
        let incomplete = |reason: String| RenderError::IncompleteTarget {
            label: self.label.clone(),
            reason,
        };
        let mut sizes = self.color_views.iter().chain(self.depth_view.iter()).map(|a| (a.width, a.height));
        let Some(size) = sizes.next() else {
            return Err(incomplete("no attachments".into()));
        };
        if size.0 == 0 || size.1 == 0 {
            return Err(incomplete(format!("zero-sized attachment {}x{}", size.0, size.1)));
        }
        if let Some(other) = sizes.find(|s| *s != size) {
            return Err(incomplete(format!(
                "attachment sizes differ: {}x{} vs {}x{}",
                size.0, size.1, other.0, other.1
            )));
        }
        for (index, color) in self.color_views.iter().enumerate() {
            if color.view.format.is_depth() {
                return Err(incomplete(format!("color attachment {index} has depth format")));
            }
        }
        if let Some(depth) = &self.depth_view {
            if !depth.view.format.is_depth() {
                return Err(incomplete(format!("depth attachment has color format {:?}", depth.view.format)));
            }
        }
        Ok(())
    }

    /// [`is_complete`](Self::is_complete), logging the failure. Returns whether the target is usable.
    pub fn check(&self) -> bool {
        match self.is_complete() {
            Ok(()) => true,
            Err(e) => {
                log::error!("{}", e);
                false
            }
        }
    }

    /// Attachments as the context sees them.
    pub fn binding(&self) -> TargetBinding {
        let (width, height) = self.size();
        TargetBinding {
            label: self.label.clone(),
            width,
            height,
            colors: self.color_views.iter().map(|a| a.view).collect(),
            depth: self.depth_view.map(|a| a.view),
        }
    }

    pub fn bind<B: GraphicsBackend>(&self, ctx: &mut GpuContext<B>, kind: BindKind) {
        let target = DrawTarget::Offscreen(self.binding());
        match kind {
            BindKind::Read => ctx.bind_read_target(target),
            BindKind::Draw => ctx.bind_draw_target(target),
            BindKind::Both => {
                ctx.bind_read_target(target.clone());
                ctx.bind_draw_target(target);
            }
        }
    }

    /// Bind for drawing and clear color to the context clear color and depth to 1.
    pub fn clear<B: GraphicsBackend>(&self, ctx: &mut GpuContext<B>) -> RenderResult<()> {
        self.bind(ctx, BindKind::Draw);
        ctx.clear()
    }

    /// Expose color output `index` on texture unit `unit`.
    pub fn bind_color_attachment<B: GraphicsBackend>(
        &self,
        ctx: &mut GpuContext<B>,
        index: usize,
        unit: u32,
    ) -> RenderResult<()> {
        let texture = self.color_attachment(index).ok_or_else(|| RenderError::MissingAttachment {
            label: self.label.clone(),
            index,
        })?;
        texture.bind(ctx, unit);
        Ok(())
    }

    pub fn color_attachment(&self, index: usize) -> Option<&Texture> {
        self.colors.get(index)
    }

    pub fn color_attachment_mut(&mut self, index: usize) -> Option<&mut Texture> {
        self.colors.get_mut(index)
    }

    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    pub fn color_formats(&self) -> Vec<TextureFormat> {
        self.color_views.iter().map(|a| a.view.format).collect()
    }

    pub fn depth_texture(&self) -> Option<&Texture> {
        self.depth.as_ref()
    }

    pub fn depth_size(&self) -> Option<(u32, u32)> {
        self.depth_view.map(|a| (a.width, a.height))
    }

    /// Size of the first attachment.
    pub fn size(&self) -> (u32, u32) {
        self.color_views
            .first()
            .or(self.depth_view.as_ref())
            .map(|a| (a.width, a.height))
            .unwrap_or((0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use crate::backend::RecordingBackend;

    #[test]
    fn test_empty_target_is_incomplete() {
        let target = RenderTarget::new("empty");
        assert!(matches!(target.is_complete(), Err(RenderError::IncompleteTarget { .. })));
        assert!(!target.check());
    }

    #[test]
    fn test_size_mismatch_is_incomplete() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let mut target = RenderTarget::new("mismatch");
        let color = Texture::render_target(&mut ctx, "c", 64, 64, TextureFormat::Rgba16Float).unwrap();
        target.attach_color_targets(vec![color]);
        target.attach_depth_buffer(&mut ctx, 32, 32).unwrap();
        assert!(target.is_complete().is_err());
        target.resize(&mut ctx, 64, 64).unwrap();
        assert!(target.is_complete().is_ok());
    }

    #[rstest]
    #[case(128, 72)]
    #[case(16, 16)]
    fn test_resize_keeps_color_attachments(#[case] width: u32, #[case] height: u32) {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let mut target = RenderTarget::new("hdr");
        let colors = ["scene", "bright"]
            .iter()
            .map(|name| Texture::render_target(&mut ctx, name, 64, 64, TextureFormat::Rgba16Float).unwrap())
            .collect::<Vec<_>>();
        let first = colors[0].handle();
        target.attach_color_targets(colors);
        target.attach_depth_buffer(&mut ctx, 64, 64).unwrap();

        target.resize(&mut ctx, width, height).unwrap();

        assert_eq!(target.color_count(), 2);
        assert_eq!(target.color_attachment(0).map(Texture::handle), Some(first));
        let depth = target.depth_texture().unwrap();
        assert_eq!((depth.width(), depth.height()), (width, height));
        assert_eq!(target.depth_size(), Some((width, height)));
        // Colors keep their size, so only a matching resize leaves the target drawable.
        assert!(target.is_complete().is_err());
        target.resize(&mut ctx, 64, 64).unwrap();
        assert!(target.is_complete().is_ok());
        assert_eq!(target.color_attachment(0).map(Texture::handle), Some(first));
    }

    #[test]
    fn test_missing_attachment() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let target = RenderTarget::new("none");
        assert!(matches!(
            target.bind_color_attachment(&mut ctx, 2, 0),
            Err(RenderError::MissingAttachment { index: 2, .. })
        ));
    }

    #[test]
    fn test_face_attachment_takes_mip_size() {
        let mut ctx = GpuContext::new(RecordingBackend::default()).unwrap();
        let cube = Texture::cube(&mut ctx, "prefilter", 128, 5, TextureFormat::Rgba16Float).unwrap();
        let mut capture = RenderTarget::new("capture");
        capture.attach_color_face(&cube, 3, 2).unwrap();
        capture.resize(&mut ctx, 32, 32).unwrap();
        assert_eq!(capture.size(), (32, 32));
        assert!(capture.is_complete().is_ok());
        assert_eq!(capture.color_count(), 0);
    }
}

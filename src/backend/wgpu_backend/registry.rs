//! Every wgpu object the backend owns, keyed by the id inside its handle.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::TextureDescriptor;

pub(super) struct TextureEntry {
    pub texture: wgpu::Texture,
    pub desc: TextureDescriptor,
    /// Views to drop together with the texture
    pub views: Vec<u64>,
}

pub(super) enum Resource {
    Buffer(wgpu::Buffer),
    Texture(TextureEntry),
    View(wgpu::TextureView),
    Sampler(wgpu::Sampler),
    BindGroupLayout(wgpu::BindGroupLayout),
    BindGroup(wgpu::BindGroup),
    Pipeline(wgpu::RenderPipeline),
}

/// One id space shared by all resource kinds, so a stale handle of one kind
/// never aliases a live resource of another.
#[derive(Default)]
pub(super) struct Registry {
    entries: HashMap<u64, Resource>,
    last_id: u64,
}

macro_rules! lookup {
    ($name:ident, $handle:ty, $variant:ident, $target:ty, $kind:literal) => {
        pub fn $name(&self, handle: $handle) -> BackendResult<&$target> {
            match self.entries.get(&handle.0) {
                Some(Resource::$variant(resource)) => Ok(resource),
                _ => Err(BackendError::UnknownHandle {
                    kind: $kind,
                    id: handle.0,
                }),
            }
        }
    };
}

impl Registry {
    pub fn insert(&mut self, resource: Resource) -> u64 {
        self.last_id += 1;
        self.entries.insert(self.last_id, resource);
        self.last_id
    }

    pub fn remove(&mut self, id: u64) -> Option<Resource> {
        self.entries.remove(&id)
    }

    /// Drop a texture and every view created from it.
    pub fn remove_texture(&mut self, handle: TextureHandle) {
        match self.entries.remove(&handle.0) {
            Some(Resource::Texture(entry)) => {
                for view in entry.views {
                    self.entries.remove(&view);
                }
            }
            Some(other) => {
                self.entries.insert(handle.0, other);
            }
            None => {}
        }
    }

    pub fn add_view(&mut self, texture: TextureHandle, view: wgpu::TextureView) -> BackendResult<TextureViewHandle> {
        let id = self.insert(Resource::View(view));
        match self.entries.get_mut(&texture.0) {
            Some(Resource::Texture(entry)) => {
                entry.views.push(id);
                Ok(TextureViewHandle(id))
            }
            _ => {
                self.entries.remove(&id);
                Err(BackendError::UnknownHandle {
                    kind: "texture",
                    id: texture.0,
                })
            }
        }
    }

    lookup!(buffer, BufferHandle, Buffer, wgpu::Buffer, "buffer");
    lookup!(texture, TextureHandle, Texture, TextureEntry, "texture");
    lookup!(view, TextureViewHandle, View, wgpu::TextureView, "texture view");
    lookup!(sampler, SamplerHandle, Sampler, wgpu::Sampler, "sampler");
    lookup!(
        bind_group_layout,
        BindGroupLayoutHandle,
        BindGroupLayout,
        wgpu::BindGroupLayout,
        "bind group layout"
    );
    lookup!(bind_group, BindGroupHandle, BindGroup, wgpu::BindGroup, "bind group");
    lookup!(pipeline, RenderPipelineHandle, Pipeline, wgpu::RenderPipeline, "render pipeline");
}

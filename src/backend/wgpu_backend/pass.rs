//! Render passes are recorded while open and encoded in one go when closed.
//!
//! A `wgpu::RenderPass` borrows the encoder and every resource it touches, so
//! it cannot stay alive across the `&mut self` trait calls that fill it.

use std::ops::Range;

use super::convert;
use super::registry::Registry;
use crate::backend::traits::*;

pub(super) enum Command {
    Pipeline(RenderPipelineHandle),
    BindGroup {
        index: u32,
        group: BindGroupHandle,
        offsets: Vec<u32>,
    },
    VertexBuffer {
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
    },
    IndexBuffer {
        buffer: BufferHandle,
        offset: u64,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

pub(super) struct RecordedPass {
    desc: RenderPassDescriptor,
    commands: Vec<Command>,
}

/// Log and skip anything that refers to a resource that no longer exists.
fn live<T>(result: BackendResult<T>, pass: &RenderPassDescriptor) -> Option<T> {
    result
        .map_err(|e| log::warn!("Pass {:?}: {}", pass.label.as_deref().unwrap_or("unnamed"), e))
        .ok()
}

impl RecordedPass {
    pub fn new(desc: &RenderPassDescriptor) -> Self {
        Self {
            desc: desc.clone(),
            commands: Vec::new(),
        }
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, registry: &Registry) {
        let desc = &self.desc;
        let color_attachments: Vec<_> = desc
            .color_attachments
            .iter()
            .map(|attachment| {
                live(registry.view(attachment.view), desc).map(|view| wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: convert::color_load(attachment.load_op),
                        store: attachment.store_op.into(),
                    },
                })
            })
            .collect();
        let depth_stencil_attachment = desc.depth_stencil_attachment.as_ref().and_then(|attachment| {
            live(registry.view(attachment.view), desc).map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: convert::depth_load(attachment.depth_load_op, attachment.depth_clear_value),
                    store: attachment.depth_store_op.into(),
                }),
                stencil_ops: None,
            })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: desc.label.as_deref(),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for command in &self.commands {
            match command {
                Command::Pipeline(handle) => {
                    if let Some(pipeline) = live(registry.pipeline(*handle), desc) {
                        pass.set_pipeline(pipeline);
                    }
                }
                Command::BindGroup { index, group, offsets } => {
                    if let Some(group) = live(registry.bind_group(*group), desc) {
                        pass.set_bind_group(*index, group, offsets);
                    }
                }
                Command::VertexBuffer { slot, buffer, offset } => {
                    if let Some(buffer) = live(registry.buffer(*buffer), desc) {
                        pass.set_vertex_buffer(*slot, buffer.slice(*offset..));
                    }
                }
                Command::IndexBuffer { buffer, offset } => {
                    if let Some(buffer) = live(registry.buffer(*buffer), desc) {
                        pass.set_index_buffer(buffer.slice(*offset..), wgpu::IndexFormat::Uint32);
                    }
                }
                Command::Draw { vertices, instances } => pass.draw(vertices.clone(), instances.clone()),
                Command::DrawIndexed {
                    indices,
                    base_vertex,
                    instances,
                } => pass.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
            }
        }
    }
}

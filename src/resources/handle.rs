//! Owning wrappers around backend handles.
//!
//! Backend handles are plain ids. Resources that own one hold it in an [`Owned`]
//! wrapper which, when dropped, queues the id for destruction. The context drains
//! the queue after every submit, once no recorded command can refer to it anymore.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{BufferHandle, GraphicsBackend, TextureHandle};

/// A handle waiting to be destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

/// Backend handles that can be owned.
pub trait OwnedResource: Copy + fmt::Debug {
    fn released(self) -> Released;
}

impl OwnedResource for BufferHandle {
    fn released(self) -> Released {
        Released::Buffer(self)
    }
}

impl OwnedResource for TextureHandle {
    fn released(self) -> Released {
        Released::Texture(self)
    }
}

/// Shared queue of handles whose owners have been dropped.
#[derive(Clone, Default)]
pub struct ReleaseQueue {
    pending: Arc<Mutex<Vec<Released>>>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a freshly created handle.
    pub fn own<H: OwnedResource>(&self, handle: H) -> Owned<H> {
        Owned {
            handle,
            queue: self.clone(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Destroy everything released so far.
    pub fn drain<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> usize {
        let released = std::mem::take(&mut *self.pending.lock());
        for item in &released {
            match *item {
                Released::Buffer(buffer) => backend.destroy_buffer(buffer),
                Released::Texture(texture) => backend.destroy_texture(texture),
            }
        }
        if !released.is_empty() {
            log::trace!("Destroyed {} released resources", released.len());
        }
        released.len()
    }

    fn push(&self, item: Released) {
        self.pending.lock().push(item);
    }
}

/// Unique owner of a backend handle.
pub struct Owned<H: OwnedResource> {
    handle: H,
    queue: ReleaseQueue,
}

impl<H: OwnedResource> Owned<H> {
    pub fn handle(&self) -> H {
        self.handle
    }
}

impl<H: OwnedResource> fmt::Debug for Owned<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}

impl<H: OwnedResource> Drop for Owned<H> {
    fn drop(&mut self) {
        self.queue.push(self.handle.released());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BufferDescriptor, BufferUsage, RecordingBackend};

    #[test]
    fn test_drop_queues_handle() {
        let mut backend = RecordingBackend::default();
        let queue = ReleaseQueue::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 16,
                usage: BufferUsage::VERTEX,
            })
            .unwrap();

        let owned = queue.own(buffer);
        assert_eq!(queue.pending(), 0);
        drop(owned);
        assert_eq!(queue.pending(), 1);

        assert_eq!(queue.drain(&mut backend), 1);
        assert_eq!(backend.destroyed_buffers(), 1);
        assert_eq!(queue.pending(), 0);
    }
}

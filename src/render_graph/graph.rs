//! Frame graph definition and compilation

use std::collections::HashMap;

use crate::error::{RenderError, RenderResult};

/// Unique identifier for a frame graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

/// Unique identifier for a pass, its index in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u32);

impl PassId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A named resource passes read and write.
#[derive(Debug, Clone)]
pub struct GraphResource {
    pub id: ResourceId,
    pub name: String,
    /// Produced outside the graph (scene data, the precomputed environment)
    pub imported: bool,
}

/// Metadata for one declared pass
#[derive(Debug, Clone)]
pub struct PassNode<P> {
    pub id: PassId,
    pub name: String,
    pub payload: P,
    pub reads: Vec<ResourceId>,
    pub writes: Vec<ResourceId>,
}

impl<P> PassNode<P> {
    pub fn reads_resource(&self, resource: ResourceId) -> bool {
        self.reads.contains(&resource)
    }

    pub fn writes_resource(&self, resource: ResourceId) -> bool {
        self.writes.contains(&resource)
    }
}

/// Declared passes of a frame and the resources that connect them.
///
/// Declaration order is the intended order. [`compile`](Self::compile) keeps it
/// wherever dependencies allow and rejects reads nothing produces.
pub struct FrameGraph<P> {
    passes: Vec<PassNode<P>>,
    resources: Vec<GraphResource>,
    by_name: HashMap<String, ResourceId>,
}

impl<P> FrameGraph<P> {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            resources: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a resource that exists before the frame starts.
    pub fn import(&mut self, name: &str) -> ResourceId {
        let id = self.resource(name);
        self.resources[id.0 as usize].imported = true;
        id
    }

    /// Look up or create the resource called `name`.
    pub fn resource(&mut self, name: &str) -> ResourceId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = ResourceId(self.resources.len() as u32);
        self.resources.push(GraphResource {
            id,
            name: name.to_string(),
            imported: false,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn add_pass(&mut self, name: &str, payload: P, reads: &[&str], writes: &[&str]) -> PassId {
        let id = PassId(self.passes.len() as u32);
        let reads = reads.iter().map(|r| self.resource(r)).collect();
        let writes = writes.iter().map(|w| self.resource(w)).collect();
        self.passes.push(PassNode {
            id,
            name: name.to_string(),
            payload,
            reads,
            writes,
        });
        id
    }

    /// Order the passes so every read sees the write declared before it.
    ///
    /// A pass depends on the latest earlier writer of each resource it reads or
    /// writes, and on every earlier reader of each resource it writes. Among
    /// ready passes the earliest declared runs first.
    pub fn compile(&self) -> RenderResult<CompiledGraph> {
        let count = self.passes.len();
        let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut last_writer: HashMap<ResourceId, usize> = HashMap::new();
        let mut readers_since_write: HashMap<ResourceId, Vec<usize>> = HashMap::new();

        for (index, node) in self.passes.iter().enumerate() {
            for &read in &node.reads {
                match last_writer.get(&read) {
                    Some(&writer) => dependencies[index].push(writer),
                    None if self.resources[read.0 as usize].imported => {}
                    None => {
                        return Err(RenderError::Schedule(format!(
                            "pass '{}' reads '{}' before any pass writes it",
                            node.name, self.resources[read.0 as usize].name
                        )))
                    }
                }
            }
            for &write in &node.writes {
                if let Some(&writer) = last_writer.get(&write) {
                    dependencies[index].push(writer);
                }
                if let Some(readers) = readers_since_write.remove(&write) {
                    dependencies[index].extend(readers.into_iter().filter(|&r| r != index));
                }
            }
            for &read in &node.reads {
                readers_since_write.entry(read).or_default().push(index);
            }
            for &write in &node.writes {
                last_writer.insert(write, index);
            }
            dependencies[index].sort_unstable();
            dependencies[index].dedup();
        }

        // Topological sort using Kahn's algorithm
        let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
        let mut done = vec![false; count];
        let mut order = Vec::with_capacity(count);
        while order.len() < count {
            let Some(next) = (0..count).find(|&i| !done[i] && in_degree[i] == 0) else {
                return Err(RenderError::Schedule("dependency cycle between passes".into()));
            };
            done[next] = true;
            order.push(PassId(next as u32));
            for (dependent, deps) in dependencies.iter().enumerate() {
                if deps.contains(&next) {
                    in_degree[dependent] -= 1;
                }
            }
        }

        let mut resource_lifetimes: HashMap<ResourceId, ResourceLifetime> = HashMap::new();
        for (step, id) in order.iter().enumerate() {
            let node = &self.passes[id.index()];
            for &resource in node.reads.iter().chain(&node.writes) {
                let lifetime = resource_lifetimes.entry(resource).or_insert(ResourceLifetime {
                    first_use: step,
                    last_use: step,
                });
                lifetime.last_use = step;
            }
        }

        Ok(CompiledGraph {
            pass_order: order,
            resource_lifetimes,
        })
    }

    pub fn passes(&self) -> &[PassNode<P>] {
        &self.passes
    }

    pub fn pass(&self, id: PassId) -> Option<&PassNode<P>> {
        self.passes.get(id.index())
    }

    pub fn resources(&self) -> &[GraphResource] {
        &self.resources
    }

    pub fn resource_id(&self, name: &str) -> Option<ResourceId> {
        self.by_name.get(name).copied()
    }
}

impl<P> Default for FrameGraph<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource lifetime in terms of pass execution order
#[derive(Debug, Clone, Copy)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

/// Compiled frame graph with execution order and resource lifetimes
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub pass_order: Vec<PassId>,
    pub resource_lifetimes: HashMap<ResourceId, ResourceLifetime>,
}

impl CompiledGraph {
    /// Check if a resource is alive at a given execution step
    pub fn is_resource_alive(&self, resource: ResourceId, step: usize) -> bool {
        if let Some(lifetime) = self.resource_lifetimes.get(&resource) {
            step >= lifetime.first_use && step <= lifetime.last_use
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_order_is_kept() {
        let mut graph = FrameGraph::new();
        graph.import("scene");
        graph.add_pass("shadow", 0, &["scene"], &["shadow_map"]);
        graph.add_pass("geometry", 1, &["scene"], &["gbuffer"]);
        graph.add_pass("lighting", 2, &["gbuffer", "shadow_map"], &["hdr"]);
        let compiled = graph.compile().unwrap();
        let order: Vec<usize> = compiled.pass_order.iter().map(PassId::index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_read_without_writer_is_rejected() {
        let mut graph: FrameGraph<()> = FrameGraph::new();
        graph.add_pass("lighting", (), &["gbuffer"], &["hdr"]);
        graph.add_pass("geometry", (), &[], &["gbuffer"]);
        assert!(matches!(graph.compile(), Err(RenderError::Schedule(_))));
    }

    #[test]
    fn test_lifetimes_span_first_to_last_use() {
        let mut graph = FrameGraph::new();
        graph.add_pass("a", 'a', &[], &["x"]);
        graph.add_pass("b", 'b', &["x"], &["y"]);
        graph.add_pass("c", 'c', &["y"], &["z"]);
        let compiled = graph.compile().unwrap();
        let x = graph.resource_id("x").unwrap();
        assert!(compiled.is_resource_alive(x, 0));
        assert!(compiled.is_resource_alive(x, 1));
        assert!(!compiled.is_resource_alive(x, 2));
        assert_eq!(graph.pass(PassId(2)).map(|p| p.payload), Some('c'));
    }

    #[test]
    fn test_second_writer_waits_for_readers() {
        let mut graph = FrameGraph::new();
        graph.add_pass("lighting", 0, &[], &["hdr"]);
        graph.add_pass("bloom", 1, &["hdr"], &["blur"]);
        graph.add_pass("skybox", 2, &[], &["hdr"]);
        let compiled = graph.compile().unwrap();
        let order: Vec<usize> = compiled.pass_order.iter().map(PassId::index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}

use glam::{Affine3A, Quat, Vec3};
use slotmap::{SecondaryMap, SlotMap};

use crate::scene::node::Node;
use crate::scene::{InstancingComponent, NodeHandle};

/// Node storage plus the components Horde cares about.
#[derive(Debug, Default, Clone)]
pub struct SceneGraph {
    nodes: SlotMap<NodeHandle, Node>,
    root_nodes: Vec<NodeHandle>,
    instancing: SecondaryMap<NodeHandle, InstancingComponent>,
}

impl SceneGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Adds a root node.
    pub fn add_node(&mut self, node: Node) -> NodeHandle {
        let handle = self.nodes.insert(node);
        self.root_nodes.push(handle);
        handle
    }

    /// Shorthand for `add_node(Node::new(name))`.
    pub fn create_node(&mut self, name: impl Into<String>) -> NodeHandle {
        self.add_node(Node::new(name))
    }

    pub fn add_to_parent(&mut self, child: Node, parent: NodeHandle) -> NodeHandle {
        let handle = self.nodes.insert(child);

        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(handle);
            if let Some(c) = self.nodes.get_mut(handle) {
                c.parent = Some(parent);
            }
        } else {
            log::error!("Parent node not found, adding as root");
            self.root_nodes.push(handle);
        }

        handle
    }

    /// Moves `child` under `parent`.
    pub fn attach(&mut self, child: NodeHandle, parent: NodeHandle) {
        if child == parent {
            log::warn!("Cannot attach node to itself!");
            return;
        }
        if !self.nodes.contains_key(parent) {
            log::error!("Parent node not found during attach!");
            return;
        }
        if self.is_ancestor(child, parent) {
            log::warn!("Cannot attach node to its own descendant!");
            return;
        }

        self.detach_from_parent(child);

        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
        }
    }

    /// Removes a node and its whole subtree.
    pub fn remove_node(&mut self, handle: NodeHandle) {
        if !self.nodes.contains_key(handle) {
            return;
        }

        self.detach_from_parent(handle);

        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
            }
            self.instancing.remove(current);
        }
    }

    fn detach_from_parent(&mut self, handle: NodeHandle) {
        let parent = self.nodes.get(handle).and_then(|n| n.parent);
        if let Some(p) = parent {
            if let Some(n) = self.nodes.get_mut(p)
                && let Some(i) = n.children.iter().position(|&x| x == handle)
            {
                n.children.remove(i);
            }
        } else if let Some(i) = self.root_nodes.iter().position(|&x| x == handle) {
            self.root_nodes.remove(i);
        }
    }

    fn is_ancestor(&self, ancestor: NodeHandle, of: NodeHandle) -> bool {
        let mut cursor = self.nodes.get(of).and_then(|n| n.parent);
        while let Some(p) = cursor {
            if p == ancestor {
                return true;
            }
            cursor = self.nodes.get(p).and_then(|n| n.parent);
        }
        false
    }

    // ========================================================================
    // Access
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn get(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[NodeHandle] {
        &self.root_nodes
    }

    /// Topmost ancestor of `handle` (the node itself when it is a root).
    #[must_use]
    pub fn root_ancestor(&self, handle: NodeHandle) -> Option<NodeHandle> {
        let mut current = handle;
        let mut node = self.nodes.get(handle)?;
        while let Some(p) = node.parent {
            let Some(parent) = self.nodes.get(p) else {
                break;
            };
            current = p;
            node = parent;
        }
        Some(current)
    }

    /// Depth-first search for a named node in the subtree under `root`.
    #[must_use]
    pub fn find_by_name(&self, root: NodeHandle, name: &str) -> Option<NodeHandle> {
        let mut stack = vec![root];
        while let Some(h) = stack.pop() {
            let node = self.nodes.get(h)?;
            if node.name == name {
                return Some(h);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    // ========================================================================
    // Transforms
    // ========================================================================

    /// World matrix of `handle`, composed from the local transforms along
    /// its parent chain.
    #[must_use]
    pub fn compose_world_matrix(&self, handle: NodeHandle) -> Option<Affine3A> {
        let mut node = self.nodes.get(handle)?;
        let mut world = node.transform.local_matrix();

        while let Some(parent) = node.parent {
            let Some(p) = self.nodes.get(parent) else {
                break;
            };
            world = p.transform.local_matrix() * world;
            node = p;
        }

        Some(world)
    }

    /// Sets local position and rotation in one step.
    pub fn set_local_position_rotation(
        &mut self,
        handle: NodeHandle,
        position: Vec3,
        rotation: Quat,
    ) {
        if let Some(node) = self.nodes.get_mut(handle) {
            node.transform.set_position_and_rotation(position, rotation);
        }
    }

    // ========================================================================
    // Components
    // ========================================================================

    pub fn set_instancing_component(&mut self, handle: NodeHandle, component: InstancingComponent) {
        if self.nodes.contains_key(handle) {
            self.instancing.insert(handle, component);
        } else {
            log::warn!("Cannot add an instancing component to a missing node");
        }
    }

    #[must_use]
    pub fn instancing_component(&self, handle: NodeHandle) -> Option<&InstancingComponent> {
        self.instancing.get(handle)
    }

    pub fn remove_instancing_component(
        &mut self,
        handle: NodeHandle,
    ) -> Option<InstancingComponent> {
        self.instancing.remove(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_vec3(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn world_matrix_follows_parents() {
        let mut scene = SceneGraph::new();
        let root = scene.create_node("root");
        let child = scene.add_to_parent(Node::new("child"), root);

        scene.set_local_position_rotation(
            root,
            Vec3::new(1.0, 0.0, 0.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        );
        scene.get_mut(child).unwrap().transform.position = Vec3::new(0.0, 2.0, 1.0);

        let world = scene.compose_world_matrix(child).unwrap();
        assert!(approx_vec3(world.translation.into(), Vec3::new(2.0, 2.0, 0.0)));
    }

    #[test]
    fn root_ancestor_and_find() {
        let mut scene = SceneGraph::new();
        let root = scene.create_node("actor");
        let hips = scene.add_to_parent(Node::new("hips"), root);
        let hand = scene.add_to_parent(Node::new("hand"), hips);

        assert_eq!(scene.root_ancestor(hand), Some(root));
        assert_eq!(scene.root_ancestor(root), Some(root));
        assert_eq!(scene.find_by_name(root, "hand"), Some(hand));
        assert_eq!(scene.find_by_name(hips, "actor"), None);
    }

    #[test]
    fn remove_subtree_drops_components() {
        let mut scene = SceneGraph::new();
        let root = scene.create_node("actor");
        let child = scene.add_to_parent(Node::new("child"), root);
        scene.set_instancing_component(root, InstancingComponent::new("soldier", "soldier"));

        scene.remove_node(root);
        assert!(!scene.contains(root));
        assert!(!scene.contains(child));
        assert!(scene.instancing_component(root).is_none());
        assert!(scene.roots().is_empty());
    }

    #[test]
    fn attach_rejects_cycles() {
        let mut scene = SceneGraph::new();
        let a = scene.create_node("a");
        let b = scene.add_to_parent(Node::new("b"), a);

        scene.attach(a, b);
        assert_eq!(scene.get(b).unwrap().parent(), Some(a));
        assert_eq!(scene.get(a).unwrap().parent(), None);

        let c = scene.create_node("c");
        scene.attach(c, b);
        assert_eq!(scene.get(c).unwrap().parent(), Some(b));
        assert_eq!(scene.roots(), &[a]);
    }
}

//! Scene Graph
//!
//! The minimal host scene Horde works against. Bakers pose bone nodes in it;
//! the runtime reads actor world matrices from it and writes root motion back.

pub mod component;
pub mod graph;
pub mod node;
pub mod transform;

pub use component::InstancingComponent;
pub use graph::SceneGraph;
pub use node::Node;
pub use transform::Transform;

slotmap::new_key_type! {
    pub struct NodeHandle;
}

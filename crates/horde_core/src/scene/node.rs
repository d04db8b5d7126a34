use crate::scene::NodeHandle;
use crate::scene::transform::Transform;

/// A named scene node with a parent link and a local transform.
///
/// Components (such as the instancing component) are stored on the
/// [`SceneGraph`](super::SceneGraph), not on the node.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Transform,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,
}

impl Node {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            parent: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }
}

//! Contains the core types needed for most APIs of the voxel world:
//! content ids, node and block positions, the `MapNode` itself and the
//! node-type registry.

mod content;
mod map_node;
mod position;
mod registry;

pub use content::*;
pub use map_node::*;
pub use position::*;
pub use registry::*;

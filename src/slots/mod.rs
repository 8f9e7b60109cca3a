//! Rule slots: definitions and the registry that holds them.

mod definition;
mod registry;

pub use definition::{Cardinality, ParamScope, Slot, ValueShape, INDEX_PLACEHOLDER};
pub use registry::SlotRegistry;

/// Descriptor module - descriptor-set layouts, pool, sets and batched updates

pub mod descriptor_registry;
mod pending_updates;

pub use descriptor_registry::*;

/// Pipeline module - graphics pipeline and named descriptor binding groups

pub mod pipeline_object;

pub use pipeline_object::*;

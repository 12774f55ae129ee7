/// Command module - frame command recording and queue submission

pub mod command_recorder;

pub use command_recorder::*;

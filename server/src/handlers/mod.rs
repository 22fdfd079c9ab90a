//! Request handlers for the task collection.

mod tasks;

pub use tasks::*;

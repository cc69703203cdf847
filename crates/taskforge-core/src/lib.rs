pub mod batch;
pub mod checkpoint;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod grouping;
pub mod io;
pub mod loader;
pub mod lock;
pub mod ordinal;
pub mod parse;
pub mod paths;
pub mod pipeline;
pub mod render;
pub mod requirement;
pub mod subtask;
pub mod trace;
pub mod types;
pub mod validate;

pub use error::{Result, TaskforgeError};

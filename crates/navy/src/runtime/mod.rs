//! Runtime components for backend process execution

pub mod compose;
pub mod exec;
pub mod log_stream;

pub use compose::*;
pub use exec::*;
pub use log_stream::*;

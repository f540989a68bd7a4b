//! Task Graph System
//!
//! A retained list of GPU tasks over persistent resources. Tasks declare how
//! they access each resource; completing the graph plans the barriers between
//! those accesses, and executing it runs the tasks in declaration order.

pub mod barrier;
pub mod executor;
pub mod graph;
pub mod resource;
pub mod task;

pub use barrier::*;
pub use executor::*;
pub use graph::*;
pub use resource::*;
pub use task::*;

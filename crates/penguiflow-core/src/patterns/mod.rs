//! Reusable node-construction patterns layered on top of the bare worker
//! loop: bounded concurrent map, k-way join, routers, and subflow
//! invocation.

pub mod join_k;
pub mod map_concurrent;
pub mod playbook;
pub mod router;

pub use join_k::join_k;
pub use map_concurrent::map_concurrent;
pub use playbook::call_playbook;
pub use router::{discriminated_router, predicate_router};

//! Structural analyses over a definition (reachability, cascade risk).
pub mod topology;

pub use topology::Topology;

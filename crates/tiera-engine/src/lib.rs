//! tiera engine: policy graph and cascade resolution
//!
//! Policies are loaded once (and atomically reloaded) into a `PolicyGraph`;
//! the `Resolver` walks a policy's stages for each request.

pub mod engine;
pub mod merge;
pub mod policy;

pub use engine::{EngineConfig, Resolution, ResolutionState, Resolver};
pub use merge::merge_answers;
pub use policy::{Policy, PolicyDefinition, PolicyGraph, Stage, StageDefinition};

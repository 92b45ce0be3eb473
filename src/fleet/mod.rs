//! Fleet composition and orchestration.

mod allocator;
mod orchestrator;

pub use allocator::{
    allocate_families, build_descriptors, AgentDescriptor, AgentRole, BrowserFamily,
};
pub use orchestrator::{FleetSummary, SessionOrchestrator};

//! Agent module: capabilities, execution, and reasoning.

pub mod agent;
pub mod capability;
pub mod reasoning;

pub use agent::{Agent, AgentState, Experience};
pub use capability::{Capability, CapabilityMatcher, ConfidenceUpdater};
pub use reasoning::{ReasoningChain, ReasoningEngine, ReasoningStep};

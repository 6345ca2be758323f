//! Channel definitions and the channel registry.
//!
//! Definitions are immutable once loaded; a reload replaces the whole
//! registry in one step.

mod definition;
mod registry;

pub use definition::{ChannelDefinition, LOCAL_SPECIAL_TYPE, UNBOUNDED_RANGE};
pub use registry::ChannelRegistry;

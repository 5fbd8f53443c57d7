//! ImageShift client recovery agent.
//!
//! Detects broken `<img>` elements, swaps them to a placeholder and asks the server
//! for a working replacement. [`RecoveryAgent`] is the event-driven core and performs
//! no I/O. With the `client` feature, `FallbackClient` talks to the fallback endpoint
//! from native code; the browser host lives in `imgshift-agent-web`.

pub mod agent;
#[cfg(feature = "client")]
pub mod client;
pub mod snapshot;

pub use agent::{
    AgentConfig, Command, ElementState, FallbackReply, RecoveryAgent,
    INTERSECTION_ROOT_MARGIN_PX, MUTATION_DEBOUNCE,
};
#[cfg(feature = "client")]
pub use client::{AgentClientError, FallbackClient};
pub use snapshot::{ElementId, ImageSnapshot};

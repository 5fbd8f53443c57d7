//! Wire models shared by the HTTP surface and the client agent.

mod fallback;

pub use fallback::*;

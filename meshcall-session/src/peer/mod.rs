mod negotiation;
mod peer_entry;
mod peer_manager;

pub use negotiation::*;
pub use peer_entry::*;
pub(crate) use peer_manager::*;

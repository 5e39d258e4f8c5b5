mod local_hub;
mod pubsub;
mod signaling_channel;

pub use local_hub::*;
pub use pubsub::*;
pub use signaling_channel::*;

mod mesh_session;
mod observer;
mod room_actor;
mod session_command;

pub use mesh_session::*;
pub use observer::*;
pub(crate) use room_actor::*;
pub(crate) use session_command::*;

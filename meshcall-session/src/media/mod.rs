mod local_stream;
mod remote_stream;
mod track_kind;

pub use local_stream::*;
pub use remote_stream::*;
pub use track_kind::*;

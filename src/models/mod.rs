mod operation;
mod sample;

pub use operation::{FlushStrategy, OpKind, QueuedOperation};
pub use sample::LocationSample;

//! Sender and receiver sessions: the stream-level driver loops that tie the
//! transport, the schema cache, the codecs and the conversion pool together.

mod receiver;
mod sender;

pub use receiver::{DispatchMode, Receiver, ReceiverConfig, StopBehavior};
pub use sender::Sender;

//! Channels between pipeline stages
//!
//! Stages talk over unbounded tokio channels; end-of-stream is the channel
//! closing once every sender has been dropped.

pub mod shared;

pub use shared::{SharedReceiver, shared_channel};

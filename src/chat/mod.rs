pub mod bot;
pub mod realtime;

pub use realtime::{ChannelState, ChatRealtime};

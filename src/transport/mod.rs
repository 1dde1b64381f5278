pub mod codec;
pub mod listeners;
pub mod socket;

pub use listeners::{Listeners, Subscription};
pub use socket::{ConnectionState, SocketClient, Transport};

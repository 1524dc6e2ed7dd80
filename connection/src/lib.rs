//! Controller-side outbound request/response queue core.
//!
//! Multiplexes caller-issued OpenFlow requests onto a single duplex
//! channel, tracks in-flight requests by transaction identifier, pairs
//! incoming responses back to their requests, and periodically injects
//! barrier requests so the switch's out-of-order execution is bounded in
//! both time and message count.
//!
//! Requests are reserved and committed from any thread through a
//! [`QueueHandle`]; everything else runs on the channel's event-loop
//! thread, driven through a [`ChannelCtx`] borrow the transport
//! supplies. The transport wires four inbound hooks to the manager
//! (`channel_active`, `channel_inactive`, `channel_writability_changed`,
//! `on_message`), runs [`OutboundQueueManager::flush`] whenever the
//! [`FlushWaker`] fires, and runs [`OutboundQueueManager::barrier`] when
//! the armed one-shot timer expires.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use openflow_connection::{
//!     Config, ConnectionHandler, FlushWaker, OutboundQueueManager, QueueHandle,
//! };
//! use protocol_openflow::Message;
//!
//! struct Handler;
//!
//! impl ConnectionHandler for Handler {
//!     type Message = Message;
//!
//!     fn create_barrier_request(&self, xid: u32) -> Message {
//!         Message::barrier_request(xid)
//!     }
//!
//!     fn on_queue_changed(&self, queue: Option<QueueHandle<Message>>) {
//!         // Hand the new reservation target to the upper layer.
//!         let _ = queue;
//!     }
//! }
//!
//! struct Waker;
//!
//! impl FlushWaker for Waker {
//!     fn wake(&self) {
//!         // Wake the channel's event loop so it runs `manager.flush`.
//!     }
//! }
//!
//! let manager = OutboundQueueManager::new(Handler, Arc::new(Waker), Config::default());
//! ```

mod channel;
mod config;
mod entry;
mod error;
mod frame;
mod handle;
mod manager;
pub mod metrics;
mod queue;
mod sync;

pub use channel::{ChannelCtx, FlushSignal, FlushWaker};
pub use config::Config;
pub use entry::{Response, ResponseRx, ResponseTx, response_channel};
pub use error::ConnectionError;
pub use frame::{Frame, OutboundMessage};
pub use handle::QueueHandle;
pub use manager::{ConnectionHandler, OutboundQueueManager};

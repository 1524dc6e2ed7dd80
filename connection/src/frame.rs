//! The frame contract the queue core sits on.
//!
//! The core never parses or mutates message bodies; it only needs the
//! transaction identifier for pairing and the barrier predicate for the
//! barrier policy.

use std::net::SocketAddr;

use protocol_openflow::{Message, MsgType};

/// An opaque protocol frame carrying a transaction identifier.
pub trait Frame: Send + 'static {
    /// Transaction identifier assigned at reservation time.
    fn xid(&self) -> u32;

    /// Whether this frame is a barrier request.
    fn is_barrier(&self) -> bool;
}

impl Frame for Message {
    fn xid(&self) -> u32 {
        Message::xid(self)
    }

    fn is_barrier(&self) -> bool {
        self.msg_type() == MsgType::BarrierRequest
    }
}

/// A frame wrapped for the transport, carrying the remote address on
/// datagram channels.
#[derive(Debug)]
pub enum OutboundMessage<M> {
    /// Stream transport: the frame alone.
    Stream(M),
    /// Datagram transport: the frame and its destination.
    Datagram(M, SocketAddr),
}

impl<M> OutboundMessage<M> {
    /// The wrapped frame.
    pub fn message(&self) -> &M {
        match self {
            OutboundMessage::Stream(m) => m,
            OutboundMessage::Datagram(m, _) => m,
        }
    }

    /// Unwrap the frame, discarding the envelope.
    pub fn into_message(self) -> M {
        match self {
            OutboundMessage::Stream(m) => m,
            OutboundMessage::Datagram(m, _) => m,
        }
    }

    /// The destination address, if this is a datagram envelope.
    pub fn remote(&self) -> Option<SocketAddr> {
        match self {
            OutboundMessage::Stream(_) => None,
            OutboundMessage::Datagram(_, addr) => Some(*addr),
        }
    }
}

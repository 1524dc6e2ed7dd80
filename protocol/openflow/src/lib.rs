//! OpenFlow 1.3 wire header and fixed-layout message codecs.
//!
//! This crate provides the small wire layer the connection core sits on:
//! the 8-byte OpenFlow header, the message-type registry, and codecs for
//! the handful of fixed-layout messages the controller side emits itself
//! (HELLO, ECHO, BARRIER, SET_CONFIG). Message bodies beyond the fixed
//! layouts are carried as opaque bytes; full protocol modelling belongs
//! to higher layers.
//!
//! # Example
//!
//! ```
//! use protocol_openflow::{Message, MsgType};
//! use bytes::BytesMut;
//!
//! // Encode a barrier request
//! let msg = Message::barrier_request(7);
//! let mut buf = BytesMut::new();
//! msg.encode(&mut buf);
//! assert_eq!(&buf[..], &[0x04, 20, 0x00, 0x08, 0x00, 0x00, 0x00, 0x07]);
//!
//! // Parse it back
//! let (parsed, consumed) = Message::parse(&buf).unwrap();
//! assert_eq!(parsed.msg_type(), MsgType::BarrierRequest);
//! assert_eq!(parsed.xid(), 7);
//! assert_eq!(consumed, 8);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// OpenFlow protocol version 1.3.
pub const OFP_VERSION: u8 = 0x04;

/// Length of the fixed OpenFlow header in bytes.
pub const HEADER_LEN: usize = 8;

/// Parse error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing.
    #[error("incomplete")]
    Incomplete,
    /// Unknown message type byte.
    #[error("unknown message type {0}")]
    UnknownType(u8),
    /// Header or length field is malformed.
    #[error("invalid message")]
    Invalid,
}

/// OpenFlow 1.3 message types (OpenFlow Switch Specification 1.3, §A.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// Connection setup.
    Hello = 0,
    /// Error notification.
    Error = 1,
    /// Liveness probe.
    EchoRequest = 2,
    /// Liveness probe reply.
    EchoReply = 3,
    /// Vendor extension.
    Experimenter = 4,
    /// Switch feature query.
    FeaturesRequest = 5,
    /// Switch feature reply.
    FeaturesReply = 6,
    /// Switch configuration query.
    GetConfigRequest = 7,
    /// Switch configuration reply.
    GetConfigReply = 8,
    /// Set switch configuration.
    SetConfig = 9,
    /// Packet delivered to the controller.
    PacketIn = 10,
    /// Flow removed notification.
    FlowRemoved = 11,
    /// Port status change.
    PortStatus = 12,
    /// Packet injected by the controller.
    PacketOut = 13,
    /// Flow table modification.
    FlowMod = 14,
    /// Group table modification.
    GroupMod = 15,
    /// Port modification.
    PortMod = 16,
    /// Table modification.
    TableMod = 17,
    /// Multipart (statistics) request.
    MultipartRequest = 18,
    /// Multipart (statistics) reply.
    MultipartReply = 19,
    /// Barrier request.
    BarrierRequest = 20,
    /// Barrier acknowledgement.
    BarrierReply = 21,
    /// Queue configuration query.
    QueueGetConfigRequest = 22,
    /// Queue configuration reply.
    QueueGetConfigReply = 23,
    /// Controller role request.
    RoleRequest = 24,
    /// Controller role reply.
    RoleReply = 25,
    /// Asynchronous-message filter query.
    GetAsyncRequest = 26,
    /// Asynchronous-message filter reply.
    GetAsyncReply = 27,
    /// Set asynchronous-message filter.
    SetAsync = 28,
    /// Meter table modification.
    MeterMod = 29,
}

impl MsgType {
    /// Look up a message type from its wire byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        let ty = match byte {
            0 => MsgType::Hello,
            1 => MsgType::Error,
            2 => MsgType::EchoRequest,
            3 => MsgType::EchoReply,
            4 => MsgType::Experimenter,
            5 => MsgType::FeaturesRequest,
            6 => MsgType::FeaturesReply,
            7 => MsgType::GetConfigRequest,
            8 => MsgType::GetConfigReply,
            9 => MsgType::SetConfig,
            10 => MsgType::PacketIn,
            11 => MsgType::FlowRemoved,
            12 => MsgType::PortStatus,
            13 => MsgType::PacketOut,
            14 => MsgType::FlowMod,
            15 => MsgType::GroupMod,
            16 => MsgType::PortMod,
            17 => MsgType::TableMod,
            18 => MsgType::MultipartRequest,
            19 => MsgType::MultipartReply,
            20 => MsgType::BarrierRequest,
            21 => MsgType::BarrierReply,
            22 => MsgType::QueueGetConfigRequest,
            23 => MsgType::QueueGetConfigReply,
            24 => MsgType::RoleRequest,
            25 => MsgType::RoleReply,
            26 => MsgType::GetAsyncRequest,
            27 => MsgType::GetAsyncReply,
            28 => MsgType::SetAsync,
            29 => MsgType::MeterMod,
            _ => return None,
        };
        Some(ty)
    }

    /// The wire byte for this message type.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Switch configuration fragmentation flags (SET_CONFIG / GET_CONFIG_REPLY).
pub mod config_flags {
    /// No special handling of fragments.
    pub const FRAG_NORMAL: u16 = 0;
    /// Drop fragments.
    pub const FRAG_DROP: u16 = 1;
    /// Reassemble fragments.
    pub const FRAG_REASM: u16 = 2;
}

/// An OpenFlow message: the fixed header plus an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    version: u8,
    msg_type: MsgType,
    xid: u32,
    body: Bytes,
}

impl Message {
    /// Create a message with an arbitrary opaque body.
    pub fn new(msg_type: MsgType, xid: u32, body: Bytes) -> Self {
        Self {
            version: OFP_VERSION,
            msg_type,
            xid,
            body,
        }
    }

    /// HELLO with no elements.
    pub fn hello(xid: u32) -> Self {
        Self::new(MsgType::Hello, xid, Bytes::new())
    }

    /// ECHO_REQUEST carrying an opaque payload.
    pub fn echo_request(xid: u32, payload: Bytes) -> Self {
        Self::new(MsgType::EchoRequest, xid, payload)
    }

    /// ECHO_REPLY echoing back the request payload.
    pub fn echo_reply(xid: u32, payload: Bytes) -> Self {
        Self::new(MsgType::EchoReply, xid, payload)
    }

    /// BARRIER_REQUEST (header only).
    pub fn barrier_request(xid: u32) -> Self {
        Self::new(MsgType::BarrierRequest, xid, Bytes::new())
    }

    /// BARRIER_REPLY (header only).
    pub fn barrier_reply(xid: u32) -> Self {
        Self::new(MsgType::BarrierReply, xid, Bytes::new())
    }

    /// SET_CONFIG with fragmentation flags and miss-send length.
    ///
    /// Wire layout after the header: flags (u16), miss_send_len (u16),
    /// total message length 12.
    pub fn set_config(xid: u32, flags: u16, miss_send_len: u16) -> Self {
        let mut body = BytesMut::with_capacity(4);
        body.put_u16(flags);
        body.put_u16(miss_send_len);
        Self::new(MsgType::SetConfig, xid, body.freeze())
    }

    /// Protocol version byte.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Message type.
    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    /// Transaction identifier.
    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// Opaque message body (everything after the header).
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Total encoded length (header plus body).
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }

    /// Encode the message into the buffer.
    ///
    /// The length field is computed from the body; messages whose total
    /// length would exceed the 16-bit wire field cannot be represented
    /// and are truncated-checked by debug assertion.
    pub fn encode(&self, buf: &mut BytesMut) {
        let len = self.encoded_len();
        debug_assert!(len <= u16::MAX as usize);
        buf.reserve(len);
        buf.put_u8(self.version);
        buf.put_u8(self.msg_type.as_u8());
        buf.put_u16(len as u16);
        buf.put_u32(self.xid);
        buf.extend_from_slice(&self.body);
    }

    /// Parse one message from the front of the buffer.
    ///
    /// Returns the message and the number of bytes consumed, or
    /// [`ParseError::Incomplete`] if the buffer does not yet hold a full
    /// message.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        if data.len() < HEADER_LEN {
            return Err(ParseError::Incomplete);
        }

        let version = data[0];
        let type_byte = data[1];
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);

        if length < HEADER_LEN {
            return Err(ParseError::Invalid);
        }
        if data.len() < length {
            return Err(ParseError::Incomplete);
        }

        let msg_type = MsgType::from_u8(type_byte).ok_or(ParseError::UnknownType(type_byte))?;
        let body = Bytes::copy_from_slice(&data[HEADER_LEN..length]);

        Ok((
            Self {
                version,
                msg_type,
                xid,
                body,
            },
            length,
        ))
    }
}

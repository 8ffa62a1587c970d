//! Wire-level types for the gateway's WebSocket RPC protocol (spec.md
//! §4.10): request/response/event frame shapes, the connect handshake
//! payloads, and the well-known method name constants.

pub mod frames;
pub mod handshake;
pub mod methods;

pub use frames::{ErrorShape, EventFrame, InboundFrame, ReqFrame, ResFrame, StateVersion};
pub use handshake::{AuthPayload, ConnectChallenge, ConnectParams, HelloOk};

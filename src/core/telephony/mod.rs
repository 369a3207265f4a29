//! Telephony media-stream side of the relay.
//!
//! The telephony provider opens a WebSocket to this server for each call and
//! exchanges JSON text events tagged by an `event` field. [`messages`] models
//! that protocol; [`link`] owns the socket for one call.

mod link;
pub mod messages;

pub use link::TelephonyLink;
pub use messages::{
    DtmfPayload, MarkPayload, MediaFormat, MediaPayload, OutboundMark, OutboundMedia, StartMeta,
    TelephonyCommand, TelephonyEvent,
};

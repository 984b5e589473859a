// nostr-proto: Nostr wire protocol types and codecs.
//
// Everything a relay needs to speak NIP-01 on the wire: events with
// canonical-serialization id hashing and BIP340 signature checks, filters
// with prefix/tag/time-window matching, and the positional JSON array
// messages exchanged between client and relay.

pub mod error;
pub mod event;
pub mod filter;
pub mod message;

pub use error::ProtocolError;
pub use event::{Event, EventId, Pubkey, Signature, KIND_DELETION};
pub use filter::Filter;
pub use message::{ClientMessage, RelayMessage, MAX_FRAME_SIZE};

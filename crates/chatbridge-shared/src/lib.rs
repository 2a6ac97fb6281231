//! Types shared by every chatbridge crate: identities, message payloads,
//! query nodes and the error enums that cross crate boundaries.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{QueryError, TransportError};
pub use protocol::{MessageEvent, MessageInfo, MessagePayload, Node};
pub use types::{Jid, MediaKind, MediaReference};

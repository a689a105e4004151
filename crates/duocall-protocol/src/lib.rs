//! Wire protocol shared between the Duocall relay server and clients.

mod messages;
mod types;

pub use messages::{ClientMessage, ServerMessage};
pub use types::{Participant, DEFAULT_ROOM_ID, ROOM_CAPACITY};

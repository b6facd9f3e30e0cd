pub mod room;

pub use room::{conn_key, pairings, ConnState, Connection, Room};

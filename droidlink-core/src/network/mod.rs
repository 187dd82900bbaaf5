mod connection;

pub use connection::{Connection, read_full};

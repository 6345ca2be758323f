//! TCP front end.
//!
//! Accepts line-oriented clients, asks for a name and bridges each
//! connection to the chat loop.

mod listener;
mod session;

pub use listener::{Admission, ChatServer, SessionSlot, SERVER_FULL_LINE};
pub use session::{
    validate_name, ChatSession, SessionOptions, MAX_LINE_LENGTH, MAX_NAME_LENGTH,
};

//! Unix socket control channel: one newline-terminated JSON request and one
//! response per connection.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::send_command;
pub use protocol::{Command, Response};
pub use server::{CommandHandler, IpcServer};

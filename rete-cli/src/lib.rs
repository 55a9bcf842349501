//! REPL command surface over `rete-core`: tokenizing, dispatch, the
//! sqlite-backed watch trace, and clap configuration. Generalized from
//! `agent-core`'s incident-response agent loop into a domain-neutral
//! shell for driving a forward-chaining engine directly.

pub mod command;
pub mod config;
pub mod demo;
pub mod error;
pub mod session;
pub mod watch_log;

pub use command::Command;
pub use error::CliError;
pub use session::Session;

//! Message sources and reply sinks for Parley.
//!
//! Available pieces:
//! - **Adapter**: strict validation of raw host events into canonical messages
//! - **CLI**: interactive terminal source (stdin) and reply sink (stdout)

pub mod adapter;
pub mod cli;

pub use adapter::{parse_event, to_canonical};
pub use cli::{CliChannel, LineFormat, StdoutSink, is_exit_command};

//! Delegating extraction to a worker process.
//!
//! The parent spawns its own executable (or a configured program) and reads a
//! line-oriented protocol from the child's stdout: one JSON object of string
//! metadata terminated by `\n`, followed by the extracted text until EOF. A
//! nonzero exit status marks the extraction as failed.

pub mod command;
pub mod document;
pub mod protocol;
pub mod worker;

pub use command::{ForkCommand, STDIN_ARG, WorkerInput};
pub use document::ForkedDocument;
pub use protocol::{read_header, write_header};
pub use worker::run_worker;

//! Library side of the `spl` command-line tool: argument definitions,
//! logging setup and table rendering.

pub mod cli;
pub mod logging;
pub mod summary;

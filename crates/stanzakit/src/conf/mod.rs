//! Stanza file parsing and generation.
//!
//! This module provides functions for reading and writing Splunk `.conf`
//! and `.meta` files.

pub mod parser;
pub mod writer;

pub use parser::{parse_file, parse_string};
pub use writer::{WriteOptions, apply, rewrite, write_file, write_string};

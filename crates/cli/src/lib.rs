//! Command-line front end for QuotaGate.  The `quotagate` binary in
//! `main.rs` only parses arguments and sets up logging; everything else
//! lives in [`cli`] so it can be driven from tests.

pub mod cli;

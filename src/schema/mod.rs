//! lightspeed.fix.v1 input schema
//!
//! This module defines the record format position fixes arrive in when they
//! are replayed from files or streamed over stdin, and the per-fix report
//! produced for each of them.

mod adapter;
mod fix_record;
mod report;

pub use adapter::*;
pub use fix_record::*;
pub use report::*;

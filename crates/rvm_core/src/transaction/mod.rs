//! Transaction management.
//!
//! RVM transactions provide:
//! - **Atomicity**: abort restores every owned segment to its state at begin
//! - **Isolation**: a segment belongs to at most one active transaction
//! - **Durability**: commit appends the final bytes of every declared range
//!   to the commit log before releasing the segments

mod manager;
mod state;

pub use manager::{CommitSummary, TransactionManager};
pub use state::Transaction;

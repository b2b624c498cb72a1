//! Fundcore Allocation - Share reservation and investment creation
//!
//! The allocator turns a settled investment payment into shares: it
//! validates the request against the opportunity's rules, atomically
//! reserves from the share pool, and creates or merges the investor's
//! investment row.
//!
//! # Invariants
//!
//! 1. `reserved_shares <= total_shares` on every opportunity, always
//! 2. At most one investment row per (investor, opportunity) pair
//! 3. An investor's total shares never exceed the opportunity's
//!    per-investor maximum
//! 4. Reservation and row upsert are all-or-nothing

mod allocator;
mod book;
mod directory;

pub use allocator::{Allocator, PurchaseOutcome};
pub use book::{ArrivalOutcome, InvestmentBook};
pub use directory::{InMemoryOpportunityDirectory, OpportunityDirectory};

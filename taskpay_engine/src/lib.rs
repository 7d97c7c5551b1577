//! # The TaskPay escrow engine
//!
//! This crate holds everything needed to run an escrow-mediated paid-work flow between a requester and a worker:
//!
//! * The order lifecycle state machine ([`OrderLifecycleApi`]), which pairs every status transition with its
//!   ledger side effect.
//! * The storage contract ([`traits::EscrowDatabase`]) and its SQLite implementation ([`SqliteDatabase`]).
//! * The confirmation-code machinery: generation ([`helpers::codes`]), mail matching
//!   ([`helpers::mail_matcher`]) and the [`traits::EmailGateway`] seam the server plugs a transport into.
//! * Advisory notification events ([`events`]) fired after completions and refunds.
//!
//! ## Money conservation
//!
//! The engine maintains one invariant above all others: at every moment, the sum of all balances plus the sum of
//! the amounts of all non-terminal orders is constant. Creating an order debits the requester and parks the
//! amount in escrow; exactly one of confirmation (credit the worker) or expiry (refund the requester) releases
//! it. Both release paths are single atomic backend operations, so concurrent confirmation and expiry on the
//! same order settle it exactly once.

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

mod api;
pub use api::{DeliveryOutcome, LifecycleSettings, OrderLifecycleApi};

#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::{
    db::{create_database_if_missing, db_url, new_pool, run_migrations},
    SqliteDatabase,
};

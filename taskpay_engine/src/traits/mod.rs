//! Behaviour contracts for engine backends.
//!
//! Storage backends implement [`AccountManagement`] and [`EscrowDatabase`]; mail transports implement
//! [`EmailGateway`]. The lifecycle API is generic over both, so the engine core never touches SQL or SMTP directly.
mod email_gateway;
mod escrow_database;

pub use email_gateway::{ConfirmationCandidate, EmailGateway, EmailGatewayError, InboundEmail};
pub use escrow_database::{AccountManagement, EscrowDatabase, EscrowError};

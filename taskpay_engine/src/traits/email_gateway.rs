use thiserror::Error;

/// A raw inbound message as seen by a mail transport, before candidate extraction.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    /// The raw `From` header. Attributable only as far as mail headers are attributable; see the matching helpers
    /// for the trust boundary this implies.
    pub sender: String,
    pub subject: String,
    pub body: String,
}

/// An (order, code) pair extracted from an inbound mail. One message yields at most one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationCandidate {
    pub order_id: i64,
    pub code: String,
}

/// The mail transport boundary. Implementations wrap SMTP/IMAP (or a test double); the engine only ever sees this
/// trait. Both calls go over the network and must be time-bounded by the implementation; neither is invoked while
/// the engine holds any store transaction.
#[allow(async_fn_in_trait)]
pub trait EmailGateway {
    /// Delivers the confirmation code for `order_id` to the worker's registered address.
    async fn send_confirmation(&self, to: &str, order_id: i64, code: &str) -> Result<(), EmailGatewayError>;

    /// Returns the finite batch of confirmation candidates currently in the inbox, in the order received.
    /// When `sender_filter` is given, only mails whose sender matches it are considered.
    async fn poll_candidates(
        &self,
        sender_filter: Option<&str>,
    ) -> Result<Vec<ConfirmationCandidate>, EmailGatewayError>;
}

#[derive(Debug, Clone, Error)]
pub enum EmailGatewayError {
    #[error("Could not send the confirmation mail: {0}")]
    SendFailure(String),
    #[error("Could not poll the inbox: {0}")]
    PollFailure(String),
}

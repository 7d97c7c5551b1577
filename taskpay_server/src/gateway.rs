use log::*;
use taskpay_engine::traits::{ConfirmationCandidate, EmailGateway, EmailGatewayError};

/// A stand-in mail transport for deployments without an SMTP/IMAP link configured. Outbound sends fail (so the
/// dispatch error surfaces to the caller) and the inbox is always empty. Swap in a real transport by implementing
/// [`EmailGateway`] over it.
#[derive(Debug, Clone, Default)]
pub struct NullEmailGateway;

impl EmailGateway for NullEmailGateway {
    async fn send_confirmation(&self, to: &str, order_id: i64, _code: &str) -> Result<(), EmailGatewayError> {
        warn!("📧️ No mail transport configured. The confirmation code for order #{order_id} was not sent to {to}.");
        Err(EmailGatewayError::SendFailure("no mail transport configured".to_string()))
    }

    async fn poll_candidates(
        &self,
        _sender_filter: Option<&str>,
    ) -> Result<Vec<ConfirmationCandidate>, EmailGatewayError> {
        Ok(Vec::new())
    }
}

//! Extraction of confirmation candidates from inbound mail.
//!
//! The wire format is two textual markers: `ORDER-` followed by the order number, and `CODE-` followed by the
//! six digit confirmation code. A message yields a candidate only when both markers are present. Binding the
//! forwarded mail to the assigned worker is done by substring-matching the registered contact address against the
//! `From` header. Mail sender headers are spoofable, so this authenticates the forwarder only as far as the mail
//! provider does. Known limitation, kept for compatibility with the confirmation protocol.
use std::sync::OnceLock;

use regex::Regex;

use crate::traits::{ConfirmationCandidate, InboundEmail};

fn order_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ORDER-(\d+)").unwrap())
}

fn code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"CODE-(\d{6})").unwrap())
}

/// Extracts an (order, code) candidate from message text. Both markers must be present.
pub fn extract_candidate(text: &str) -> Option<ConfirmationCandidate> {
    let order_id = order_regex().captures(text).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse::<i64>().ok())?;
    let code = code_regex().captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())?;
    Some(ConfirmationCandidate { order_id, code })
}

/// Case-insensitive substring match of the registered contact address against a raw `From` header, which usually
/// looks like `Jane Doe <jane@example.com>`.
pub fn sender_matches(registered: &str, from_header: &str) -> bool {
    from_header.to_lowercase().contains(&registered.to_lowercase())
}

/// Turns a batch of raw messages into candidates, preserving the order received. Messages failing the sender
/// filter or missing either marker are dropped.
pub fn candidates_from_messages<I>(messages: I, sender_filter: Option<&str>) -> Vec<ConfirmationCandidate>
where I: IntoIterator<Item = InboundEmail> {
    messages
        .into_iter()
        .filter(|msg| sender_filter.map(|s| sender_matches(s, &msg.sender)).unwrap_or(true))
        .filter_map(|msg| {
            let text = format!("{}\n{}", msg.subject, msg.body);
            extract_candidate(&text)
        })
        .collect()
}

/// The body of the confirmation mail sent to the worker. The worker forwards this mail verbatim to the system
/// inbox, so the markers here are the same ones [`extract_candidate`] looks for.
pub fn confirmation_mail_body(order_id: i64, code: &str, reply_to: &str) -> String {
    format!(
        "Hello!\nBelow is the confirmation code for the payout on your order:\nORDER-{order_id}\nCODE-{code}\nForward \
         this mail to {reply_to} to confirm the payout."
    )
}

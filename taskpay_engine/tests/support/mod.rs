//! Shared plumbing for the integration tests: a throwaway SQLite store per test and a scripted mail gateway.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
    Mutex,
};

use taskpay_engine::{
    create_database_if_missing,
    events::EventProducers,
    helpers::mail_matcher::{candidates_from_messages, confirmation_mail_body},
    run_migrations,
    traits::{ConfirmationCandidate, EmailGateway, EmailGatewayError, InboundEmail},
    LifecycleSettings,
    OrderLifecycleApi,
    SqliteDatabase,
};

/// Creates a fresh database under the system temp directory and migrates it. Each call gets its own file, so
/// tests never share state.
pub async fn prepare_test_env() -> SqliteDatabase {
    let _ = env_logger::try_init();
    let path = std::env::temp_dir().join(format!("taskpay_test_{}_{:08x}.db", std::process::id(), rand::random::<u32>()));
    let url = format!("sqlite://{}", path.display());
    create_database_if_missing(&url).await.expect("Could not create the test database");
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Could not connect to the test database");
    run_migrations(db.pool()).await.expect("Could not run migrations");
    db
}

pub fn lifecycle_api(
    db: SqliteDatabase,
    gateway: ScriptedGateway,
    settings: LifecycleSettings,
) -> OrderLifecycleApi<SqliteDatabase, ScriptedGateway> {
    OrderLifecycleApi::new(db, gateway, EventProducers::default(), settings)
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub order_id: i64,
    pub code: String,
}

/// A mail transport double. Outbound confirmations are recorded; the inbox is a plain vector the test pushes
/// messages into, scanned with the same matcher the production transport would use.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    inbox: Arc<Mutex<Vec<InboundEmail>>>,
    sent: Arc<Mutex<Vec<SentMail>>>,
    fail_sends: Arc<AtomicBool>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// All subsequent `send_confirmation` calls fail, simulating a broken SMTP link.
    pub fn break_outbound(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn sent_mails(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_sent(&self) -> Option<SentMail> {
        self.sent.lock().unwrap().last().cloned()
    }

    /// Simulates the worker forwarding the confirmation mail for `order_id` back to the system inbox.
    pub fn forward_confirmation(&self, from: &str, order_id: i64, code: &str) {
        let mail = InboundEmail {
            sender: from.to_string(),
            subject: format!("Fwd: payout for order {order_id}"),
            body: confirmation_mail_body(order_id, code, "escrow@example.com"),
        };
        self.inbox.lock().unwrap().push(mail);
    }

    pub fn push_raw(&self, sender: &str, subject: &str, body: &str) {
        let mail =
            InboundEmail { sender: sender.to_string(), subject: subject.to_string(), body: body.to_string() };
        self.inbox.lock().unwrap().push(mail);
    }
}

impl EmailGateway for ScriptedGateway {
    async fn send_confirmation(&self, to: &str, order_id: i64, code: &str) -> Result<(), EmailGatewayError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(EmailGatewayError::SendFailure("scripted outbound failure".to_string()));
        }
        let mail = SentMail { to: to.to_string(), order_id, code: code.to_string() };
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }

    async fn poll_candidates(
        &self,
        sender_filter: Option<&str>,
    ) -> Result<Vec<ConfirmationCandidate>, EmailGatewayError> {
        let messages = self.inbox.lock().unwrap().clone();
        Ok(candidates_from_messages(messages, sender_filter))
    }
}

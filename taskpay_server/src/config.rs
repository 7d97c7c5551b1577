use std::env;

use chrono::Duration;
use log::*;
use taskpay_engine::db_url;

const DEFAULT_CONFIRM_WINDOW: Duration = Duration::hours(24);
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const DEFAULT_CODE_LENGTH: u32 = 6;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    /// How long a worker's party has to confirm a delivery before the escrow is refunded.
    pub confirm_window: Duration,
    /// How often the reconciliation worker scans for lapsed confirmation windows.
    pub reconcile_interval: std::time::Duration,
    /// Number of digits in issued confirmation codes. The inbound mail matcher accepts exactly six digits, so
    /// changing this also requires a matching mail template change.
    pub code_length: u32,
    /// If true, pending migrations run at startup.
    pub auto_migrate: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: String::default(),
            confirm_window: DEFAULT_CONFIRM_WINDOW,
            reconcile_interval: std::time::Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            code_length: DEFAULT_CODE_LENGTH,
            auto_migrate: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = db_url();
        let confirm_window = env::var("TASKPAY_CONFIRM_WINDOW_HOURS")
            .map(|s| {
                s.parse::<i64>().map(Duration::hours).unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid value for TASKPAY_CONFIRM_WINDOW_HOURS. {e} Using the default, {} \
                         hours, instead.",
                        DEFAULT_CONFIRM_WINDOW.num_hours()
                    );
                    DEFAULT_CONFIRM_WINDOW
                })
            })
            .ok()
            .unwrap_or(DEFAULT_CONFIRM_WINDOW);
        let reconcile_interval = env::var("TASKPAY_RECONCILE_INTERVAL_SECS")
            .map(|s| {
                s.parse::<u64>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid value for TASKPAY_RECONCILE_INTERVAL_SECS. {e} Using the default, \
                         {DEFAULT_RECONCILE_INTERVAL_SECS}s, instead."
                    );
                    DEFAULT_RECONCILE_INTERVAL_SECS
                })
            })
            .ok()
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS);
        let code_length = env::var("TASKPAY_CODE_LENGTH")
            .map(|s| {
                s.parse::<u32>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid value for TASKPAY_CODE_LENGTH. {e} Using the default, \
                         {DEFAULT_CODE_LENGTH}, instead."
                    );
                    DEFAULT_CODE_LENGTH
                })
            })
            .ok()
            .unwrap_or(DEFAULT_CODE_LENGTH);
        if code_length != DEFAULT_CODE_LENGTH {
            warn!(
                "🪛️ TASKPAY_CODE_LENGTH is {code_length}, but the inbound mail matcher only accepts six digit \
                 codes. Forwarded confirmations will not match until the matcher is updated to the same length."
            );
        }
        let auto_migrate = env_flag("TASKPAY_AUTO_MIGRATE", true);
        Self {
            database_url,
            confirm_window,
            reconcile_interval: std::time::Duration::from_secs(reconcile_interval),
            code_length,
            auto_migrate,
        }
    }
}

fn env_flag(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                warn!("🪛️ {v} is not a valid value for {var}. Using the default, {default}, instead.");
                default
            },
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn env_flags_accept_the_usual_spellings() {
        // A distinct variable per case; env vars are process-global.
        env::set_var("TASKPAY_TEST_FLAG_ON", "Yes");
        env::set_var("TASKPAY_TEST_FLAG_OFF", "0");
        env::set_var("TASKPAY_TEST_FLAG_JUNK", "maybe");
        assert!(env_flag("TASKPAY_TEST_FLAG_ON", false));
        assert!(!env_flag("TASKPAY_TEST_FLAG_OFF", true));
        assert!(env_flag("TASKPAY_TEST_FLAG_JUNK", true));
        assert!(!env_flag("TASKPAY_TEST_FLAG_UNSET", false));
    }
}

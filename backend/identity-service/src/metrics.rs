use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use tracing::warn;

/// Counters emitted by the identity service.
///
/// Built explicitly by the composition root and handed to the service, so
/// tests can inspect a private instance without touching the global registry.
#[derive(Clone)]
pub struct IdentityMetrics {
    pub default_role_failures: IntCounter,
    pub auth_failures: IntCounterVec,
    pub tokens_revoked: IntCounter,
}

impl IdentityMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let default_role_failures = IntCounter::with_opts(Opts::new(
            "identity_default_role_failures_total",
            "Registrations whose default role assignment failed",
        ))?;

        let auth_failures = IntCounterVec::new(
            Opts::new(
                "identity_auth_failures_total",
                "Failed authentication attempts by reason",
            ),
            &["reason"],
        )?;

        let tokens_revoked = IntCounter::with_opts(Opts::new(
            "identity_tokens_revoked_total",
            "Tokens placed on the revocation list",
        ))?;

        Ok(Self {
            default_role_failures,
            auth_failures,
            tokens_revoked,
        })
    }

    /// Register every counter on `registry`; failures are logged, not fatal.
    pub fn register(&self, registry: &Registry) {
        for metric in [
            Box::new(self.default_role_failures.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(self.auth_failures.clone()),
            Box::new(self.tokens_revoked.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register identity metric: {}", e);
            }
        }
    }

    pub fn record_auth_failure(&self, reason: &str) {
        self.auth_failures.with_label_values(&[reason]).inc();
    }
}

//! Outbound notification seam.
//!
//! The core only hands a generated code and a recipient to a [`Notifier`];
//! transport is someone else's problem. Delivery failure must never fail
//! the surrounding business write, so callers go through [`deliver_code`],
//! which reports the outcome without propagating an error.

use std::fmt;

/// Errors surfaced by a notification backend.
#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery backend for verification codes.
pub trait Notifier: Send + Sync {
    fn send_verification_code(
        &self,
        recipient: &str,
        full_name: &str,
        code: &str,
    ) -> Result<(), NotifyError>;
}

impl fmt::Debug for dyn Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Notifier")
    }
}

/// Development backend: writes the code to the server log instead of
/// sending mail.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_verification_code(
        &self,
        recipient: &str,
        _full_name: &str,
        code: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(recipient, code, "verification code (log delivery)");
        Ok(())
    }
}

/// Sends a code, logging failures instead of propagating them.
///
/// Returns whether delivery succeeded so callers can inform the user
/// separately; the code itself stays valid either way.
pub fn deliver_code(
    notifier: &dyn Notifier,
    recipient: &str,
    full_name: &str,
    code: &str,
) -> bool {
    match notifier.send_verification_code(recipient, full_name, code) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(recipient, error = %e, "verification code delivery failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn send_verification_code(&self, _: &str, _: &str, _: &str) -> Result<(), NotifyError> {
            Err(NotifyError("smtp unreachable".into()))
        }
    }

    #[test]
    fn delivery_failure_is_contained() {
        assert!(!deliver_code(&FailingNotifier, "ana@clinic.test", "Ana", "1234"));
        assert!(deliver_code(&LogNotifier, "ana@clinic.test", "Ana", "1234"));
    }
}

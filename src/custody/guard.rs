//! Leave-page warning while commitments are still unrevealed.
//!
//! A UI-boundary adapter. The core never consults it; applications that
//! want a "you have pending reveals" prompt wire it to their navigation or
//! unload hooks.

use std::sync::Arc;

use super::KeyCustodian;
use crate::ids::CommitmentId;

/// Details for a leave-page prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWarning {
    /// Number of live unrevealed commitments
    pub count: usize,
    /// Their ids, sorted
    pub ids: Vec<CommitmentId>,
    /// Human-readable prompt text
    pub message: String,
}

/// Checks a custodian for unrevealed commitments
#[derive(Clone)]
pub struct PendingRevealGuard {
    custodian: Arc<KeyCustodian>,
}

impl PendingRevealGuard {
    /// Guard over a custodian
    pub fn new(custodian: Arc<KeyCustodian>) -> Self {
        Self { custodian }
    }

    /// `Some` while at least one live entry exists
    pub fn check(&self) -> Option<PendingWarning> {
        let ids = self.custodian.pending_ids();
        if ids.is_empty() {
            return None;
        }

        let count = ids.len();
        let message = if count == 1 {
            "You have 1 unrevealed commitment. Leaving now may make it impossible to reveal."
                .to_string()
        } else {
            format!(
                "You have {} unrevealed commitments. Leaving now may make them impossible to reveal.",
                count
            )
        };

        Some(PendingWarning {
            count,
            ids,
            message,
        })
    }
}

/// Install a `beforeunload` listener that prompts while reveals are pending
///
/// Only the first call installs a listener; later calls return `Ok(false)`.
#[cfg(target_arch = "wasm32")]
pub fn install_beforeunload_guard(custodian: Arc<KeyCustodian>) -> crate::error::Result<bool> {
    use once_cell::sync::OnceCell;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;

    use crate::error::Error;

    static INSTALLED: OnceCell<()> = OnceCell::new();

    if INSTALLED.get().is_some() {
        return Ok(false);
    }

    let window =
        web_sys::window().ok_or_else(|| Error::SessionStoreError("No window object".into()))?;
    let guard = PendingRevealGuard::new(custodian);

    let listener = Closure::<dyn FnMut(web_sys::BeforeUnloadEvent)>::new(
        move |event: web_sys::BeforeUnloadEvent| {
            if let Some(warning) = guard.check() {
                event.prevent_default();
                event.set_return_value(&warning.message);
            }
        },
    );

    window
        .add_event_listener_with_callback("beforeunload", listener.as_ref().unchecked_ref())
        .map_err(|e| Error::Internal(format!("addEventListener failed: {:?}", e)))?;

    // Lives for the rest of the page
    listener.forget();
    let _ = INSTALLED.set(());

    tracing::debug!("Installed beforeunload guard");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::Nonce;
    use crate::config::CustodyConfig;
    use crate::crypto::{EncryptionKey, OsRandom};

    #[test]
    fn test_no_warning_when_nothing_pending() {
        let custodian = Arc::new(KeyCustodian::in_memory(CustodyConfig::default()));
        assert!(PendingRevealGuard::new(custodian).check().is_none());
    }

    #[test]
    fn test_warning_lists_pending() {
        let custodian = Arc::new(KeyCustodian::in_memory(CustodyConfig::default()));
        let key = EncryptionKey::generate(&OsRandom).unwrap();
        let nonce = Nonce::generate(&OsRandom).unwrap();
        custodian.store(&"b".into(), &key, &nonce).unwrap();
        custodian.store(&"a".into(), &key, &nonce).unwrap();

        let guard = PendingRevealGuard::new(Arc::clone(&custodian));
        let warning = guard.check().unwrap();
        assert_eq!(warning.count, 2);
        assert_eq!(warning.ids, vec![CommitmentId::new("a"), CommitmentId::new("b")]);
        assert!(warning.message.contains("2 unrevealed"));

        custodian.clear().unwrap();
        assert!(guard.check().is_none());
    }
}

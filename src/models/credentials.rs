use std::fmt;

use crate::error::BridgeError;

/// Per-tenant secret material sent with every call.
///
/// `Debug` redacts the token; there is no `Serialize` impl so a bundle
/// cannot be echoed back to a client by accident.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CredentialBundle {
    token: String,
    scope_id: String,
}

impl CredentialBundle {
    pub fn new(token: impl Into<String>, scope_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            scope_id: scope_id.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn is_complete(&self) -> bool {
        !self.token.trim().is_empty() && !self.scope_id.trim().is_empty()
    }

    pub fn ensure_complete(&self) -> Result<(), BridgeError> {
        if self.token.trim().is_empty() {
            return Err(BridgeError::Configuration("CRM token is required".to_string()));
        }
        if self.scope_id.trim().is_empty() {
            return Err(BridgeError::Configuration("CRM scope id is required".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("token", &"<redacted>")
            .field("scope_id", &self.scope_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_token() {
        let creds = CredentialBundle::new("pit-secret-123", "loc-1");
        let printed = format!("{creds:?}");
        assert!(!printed.contains("pit-secret-123"));
        assert!(printed.contains("loc-1"));
    }

    #[test]
    fn blank_fields_are_incomplete() {
        assert!(CredentialBundle::new("t", "s").is_complete());
        assert!(!CredentialBundle::new("  ", "s").is_complete());
        assert!(!CredentialBundle::new("t", "").is_complete());
        assert!(matches!(
            CredentialBundle::new("", "s").ensure_complete(),
            Err(BridgeError::Configuration(_))
        ));
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// A tenant id and the bearer token issued for it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub tenant_id: String,
    pub auth_token: String,
}

impl SessionCredential {
    pub fn new(tenant_id: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            auth_token: auth_token.into(),
        }
    }

    pub fn has_valid_token_shape(&self) -> bool {
        is_token_shape_valid(Some(&self.auth_token))
    }
}

// Keep the bearer token out of logs.
impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("tenant_id", &self.tenant_id)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Structural JWT check: exactly three non-empty dot-separated segments.
/// Says nothing about signature or expiry.
pub fn is_token_shape_valid(token: Option<&str>) -> bool {
    let Some(token) = token else {
        return false;
    };
    let parts: Vec<&str> = token.split('.').collect();
    parts.len() == 3 && parts.iter().all(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        assert!(is_token_shape_valid(Some("aaa.bbb.ccc")));
        assert!(is_token_shape_valid(Some("eyJ.eyJ.sig")));

        assert!(!is_token_shape_valid(Some("aaa.bbb")));
        assert!(!is_token_shape_valid(Some("")));
        assert!(!is_token_shape_valid(None));
        assert!(!is_token_shape_valid(Some("aaa..ccc")));
        assert!(!is_token_shape_valid(Some("a.b.c.d")));
        assert!(!is_token_shape_valid(Some(".b.c")));
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = SessionCredential::new("clinic-42", "eyJ.eyJ.sig");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("clinic-42"));
        assert!(!debug.contains("eyJ"));
        assert!(credential.has_valid_token_shape());
    }
}

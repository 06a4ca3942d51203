//! Credential loading from the process environment.
//!
//! Credentials are resolved once at startup and then passed by value into the
//! link manager. A missing variable is fatal and reported by name.

use std::collections::HashMap;
use std::fmt;

use crate::error::{LinkError, Result};

/// Environment variable holding the account username.
pub const USERNAME_VAR: &str = "IP_USERNAME";

/// Environment variable holding the account password.
pub const PASSWORD_VAR: &str = "IP_PASSWORD";

/// Resolve every name in `names` through `lookup`.
///
/// Fails with [`LinkError::MissingCredential`] on the first name that has no
/// value, in the order given.
pub fn load_with<F>(names: &[&str], lookup: F) -> Result<HashMap<String, String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut values = HashMap::with_capacity(names.len());
    for &name in names {
        let value = lookup(name).ok_or_else(|| LinkError::MissingCredential(name.to_string()))?;
        values.insert(name.to_string(), value);
    }
    Ok(values)
}

/// Resolve every name in `names` from the process environment.
///
/// A variable that is set but not valid Unicode counts as missing.
pub fn load(names: &[&str]) -> Result<HashMap<String, String>> {
    load_with(names, |name| std::env::var(name).ok())
}

/// Account credentials used by the login flow.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Load `IP_USERNAME` and `IP_PASSWORD` from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load credentials through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = load_with(&[USERNAME_VAR, PASSWORD_VAR], lookup)?;
        // both keys are guaranteed present by load_with
        let username = values.remove(USERNAME_VAR).unwrap_or_default();
        let password = values.remove(PASSWORD_VAR).unwrap_or_default();
        Ok(Self::new(username, password))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_reads_both_variables() {
        let creds =
            Credentials::from_lookup(env_of(&[(USERNAME_VAR, "alice"), (PASSWORD_VAR, "hunter2")]))
                .unwrap();
        assert_eq!(creds.username(), "alice");
        assert_eq!(creds.password(), "hunter2");
    }

    #[test]
    fn test_missing_password_is_named() {
        let err = Credentials::from_lookup(env_of(&[(USERNAME_VAR, "alice")])).unwrap_err();
        match err {
            LinkError::MissingCredential(name) => assert_eq!(name, PASSWORD_VAR),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_first_missing_entry_wins() {
        let err = load_with(&["A", "B", "C"], env_of(&[("B", "x")])).unwrap_err();
        assert!(matches!(err, LinkError::MissingCredential(ref n) if n == "A"));
    }

    #[test]
    fn test_load_reads_process_environment() {
        // cargo sets this for every test binary it runs
        let values = load(&["CARGO_MANIFEST_DIR"]).unwrap();
        assert!(!values["CARGO_MANIFEST_DIR"].is_empty());

        let err = load(&["WSLINK_TEST_DEFINITELY_UNSET"]).unwrap_err();
        assert!(matches!(err, LinkError::MissingCredential(ref n) if n == "WSLINK_TEST_DEFINITELY_UNSET"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("alice", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}

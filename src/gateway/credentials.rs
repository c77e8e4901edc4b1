//! Access credential sources
//!
//! Credentials are read again for every gateway call and never cached here.

/// Supplies the credential that authorizes metering calls
pub trait CredentialProvider: Send {
    fn credential(&self) -> String;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> String + Send,
{
    fn credential(&self) -> String {
        self()
    }
}

/// A fixed credential
#[derive(Debug, Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    /// Always hand out `credential`
    pub fn new(credential: impl Into<String>) -> Self {
        Self(credential.into())
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> String {
        self.0.clone()
    }
}

/// Reads the credential from an environment variable on every call
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    /// Read the credential from the variable `var`
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredential {
    fn credential(&self) -> String {
        // an unset variable yields an empty credential; the backend rejects it
        std::env::var(&self.var).unwrap_or_default()
    }
}

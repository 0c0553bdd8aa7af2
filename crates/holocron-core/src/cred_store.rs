use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredStoreKey {
    CCache,
    ClientKeytab,
    ServerKeytab,
    Password,
    RCache,
    Verify,
}

impl CredStoreKey {
    pub fn as_str(self) -> &'static str {
        match self {
            CredStoreKey::CCache => "ccache",
            CredStoreKey::ClientKeytab => "client_keytab",
            CredStoreKey::ServerKeytab => "keytab",
            CredStoreKey::Password => "password",
            CredStoreKey::RCache => "rcache",
            CredStoreKey::Verify => "verify",
        }
    }
}

impl fmt::Display for CredStoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value options routed to the engine's credential store (`gss_key_value_set_desc`).
///
/// Setting a key twice replaces the earlier value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredStore {
    entries: Vec<(CredStoreKey, String)>,
}

impl CredStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set(mut self, key: CredStoreKey, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }
    pub fn ccache(self, location: impl Into<String>) -> Self {
        self.set(CredStoreKey::CCache, location)
    }
    pub fn client_keytab(self, location: impl Into<String>) -> Self {
        self.set(CredStoreKey::ClientKeytab, location)
    }
    pub fn server_keytab(self, location: impl Into<String>) -> Self {
        self.set(CredStoreKey::ServerKeytab, location)
    }
    pub fn password(self, password: impl Into<String>) -> Self {
        self.set(CredStoreKey::Password, password)
    }
    pub fn rcache(self, location: impl Into<String>) -> Self {
        self.set(CredStoreKey::RCache, location)
    }
    /// Principal whose keytab entry verifies freshly obtained initiator credentials.
    pub fn verify(self, principal: impl Into<String>) -> Self {
        self.set(CredStoreKey::Verify, principal)
    }
    pub fn get(&self, key: CredStoreKey) -> Option<&str> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }
    pub fn iter(&self) -> impl Iterator<Item = (CredStoreKey, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Passwords stay out of logs.
impl fmt::Debug for CredStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.entries {
            match key {
                CredStoreKey::Password => map.entry(&key.as_str(), &"<redacted>"),
                _ => map.entry(&key.as_str(), value),
            };
        }
        map.finish()
    }
}

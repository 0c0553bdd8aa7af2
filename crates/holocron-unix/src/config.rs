use std::{env, path::PathBuf};

pub const LIBRARY_ENV: &str = "HOLOCRON_GSSAPI_LIBRARY";

#[cfg(target_os = "macos")]
const DEFAULT_LIBRARIES: &[&str] = &["/System/Library/Frameworks/GSS.framework/GSS"];
#[cfg(any(target_os = "freebsd", target_os = "openbsd", target_os = "netbsd", target_os = "dragonfly"))]
const DEFAULT_LIBRARIES: &[&str] = &["libgssapi.so.10", "libgssapi_krb5.so.2"];
#[cfg(not(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
const DEFAULT_LIBRARIES: &[&str] = &["libgssapi_krb5.so.2", "libgssapi.so.3", "libgssapi_krb5.so"];

/// Which GSSAPI library to load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Path or soname of the library. The platform defaults are tried in order when unset.
    pub library: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_var(env::var_os(LIBRARY_ENV).map(PathBuf::from))
    }
    fn from_var(library: Option<PathBuf>) -> Self {
        Self {
            library: library.filter(|path| !path.as_os_str().is_empty()),
        }
    }
    pub fn library(mut self, library: impl Into<PathBuf>) -> Self {
        self.library = Some(library.into());
        self
    }
    pub(crate) fn candidates(&self) -> Vec<PathBuf> {
        match &self.library {
            Some(library) => vec![library.clone()],
            None => DEFAULT_LIBRARIES.iter().map(PathBuf::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_library_is_the_only_candidate() {
        let config = EngineConfig::default().library("/opt/krb5/lib/libgssapi_krb5.so");
        assert_eq!(config.candidates(), [PathBuf::from("/opt/krb5/lib/libgssapi_krb5.so")]);
    }

    #[test]
    fn empty_variable_means_platform_defaults() {
        let config = EngineConfig::from_var(Some(PathBuf::new()));
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.candidates().len(), DEFAULT_LIBRARIES.len());
        assert!(!config.candidates().is_empty());
    }
}

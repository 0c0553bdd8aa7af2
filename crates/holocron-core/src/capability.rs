//! What the installed GSSAPI library can do, resolved once when an engine is constructed.

use std::{collections::BTreeSet, fmt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineFamily {
    Mit,
    Heimdal,
    /// Heimdal as shipped in macOS `GSS.framework`.
    Apple,
}

impl EngineFamily {
    pub fn is_heimdal(self) -> bool {
        matches!(self, EngineFamily::Heimdal | EngineFamily::Apple)
    }
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineFamily::Mit => "MIT krb5",
            EngineFamily::Heimdal => "Heimdal",
            EngineFamily::Apple => "Apple GSS.framework",
        })
    }
}

/// Optional behaviour a caller can probe for with [`Capabilities::has_extension`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Extension {
    /// Established contexts report whether channel bindings were matched.
    ChannelBindingSignalling,
    Localname,
    /// Per-thread krb5 identity configuration. Never offered.
    Krb5Identity,
    CredStore,
    InquireName,
}

impl Extension {
    pub fn code(self) -> u32 {
        match self {
            Extension::ChannelBindingSignalling => 0,
            Extension::Localname => 1,
            Extension::Krb5Identity => 2,
            Extension::CredStore => 3,
            Extension::InquireName => 4,
        }
    }
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Extension::ChannelBindingSignalling),
            1 => Some(Extension::Localname),
            2 => Some(Extension::Krb5Identity),
            3 => Some(Extension::CredStore),
            4 => Some(Extension::InquireName),
            _ => None,
        }
    }
}

pub const SYM_LOCALNAME: &str = "gss_localname";
pub const SYM_DUPLICATE_CRED: &str = "gss_duplicate_cred";
pub const SYM_UNWRAP_AEAD: &str = "gss_unwrap_aead";
pub const SYM_INQUIRE_NAME: &str = "gss_inquire_name";
pub const SYM_ACQUIRE_CRED_FROM: &str = "gss_acquire_cred_from";
pub const SYM_STORE_CRED_INTO: &str = "gss_store_cred_into";
pub const SYM_ADD_CRED_FROM: &str = "gss_add_cred_from";
pub const SYM_MIT_REGISTER_ACCEPTOR: &str = "krb5_gss_register_acceptor_identity";
pub const SYM_HEIMDAL_REGISTER_ACCEPTOR: &str = "gsskrb5_register_acceptor_identity";
pub const SYM_KRB5_CCACHE_NAME: &str = "gss_krb5_ccache_name";
/// Exported by MIT krb5 1.19 and later, the release that added `GSS_C_CHANNEL_BOUND_FLAG`.
pub const SYM_KRB5_NT_X509_CERT: &str = "GSS_KRB5_NT_X509_CERT";

/// Symbols whose presence is recorded at probe time.
pub const PROBED_SYMBOLS: [&str; 11] = [
    SYM_LOCALNAME,
    SYM_DUPLICATE_CRED,
    SYM_UNWRAP_AEAD,
    SYM_INQUIRE_NAME,
    SYM_ACQUIRE_CRED_FROM,
    SYM_STORE_CRED_INTO,
    SYM_ADD_CRED_FROM,
    SYM_MIT_REGISTER_ACCEPTOR,
    SYM_HEIMDAL_REGISTER_ACCEPTOR,
    SYM_KRB5_CCACHE_NAME,
    SYM_KRB5_NT_X509_CERT,
];

/// Known library defects, each consulted at exactly the call site it affects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quirks {
    /// `gss_add_cred` cannot modify its input handle and always needs an output handle.
    pub add_cred_requires_new_handle: bool,
    /// `gss_add_cred` exists but does not work.
    pub add_cred_defective: bool,
    /// `gss_inquire_cred` reports a usage other than the one acquired.
    pub misreports_cred_usage: bool,
    /// `gss_inquire_cred_by_mech` swaps the lifetimes of accept-only credentials.
    pub swaps_accept_expiry_by_mech: bool,
    /// Names taken from a credential acquired without a name cannot be used afterwards.
    pub unstable_default_name: bool,
    /// `gss_inquire_context` may leave the mechanism unset.
    pub omits_context_mech: bool,
    /// Default credentials cannot be acquired for both usages in one call.
    pub cannot_acquire_both_by_default: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    family: EngineFamily,
    symbols: BTreeSet<&'static str>,
    channel_bound: bool,
    quirks: Quirks,
}

impl Capabilities {
    /// Resolves the capability table from a symbol lookup over [`PROBED_SYMBOLS`].
    pub fn probe(family: EngineFamily, has_symbol: impl Fn(&str) -> bool) -> Self {
        let symbols: BTreeSet<&'static str> = PROBED_SYMBOLS.into_iter().filter(|s| has_symbol(s)).collect();
        let heimdal = family.is_heimdal();
        let heimdal_7 = heimdal && symbols.contains(SYM_UNWRAP_AEAD);
        let channel_bound = match family {
            EngineFamily::Mit => symbols.contains(SYM_KRB5_NT_X509_CERT),
            EngineFamily::Heimdal => symbols.contains(SYM_DUPLICATE_CRED),
            EngineFamily::Apple => false,
        };
        let quirks = Quirks {
            add_cred_requires_new_handle: heimdal,
            add_cred_defective: heimdal && !symbols.contains(SYM_DUPLICATE_CRED),
            misreports_cred_usage: heimdal,
            swaps_accept_expiry_by_mech: heimdal,
            unstable_default_name: heimdal_7,
            omits_context_mech: family == EngineFamily::Apple,
            cannot_acquire_both_by_default: heimdal,
        };
        tracing::debug!(%family, ?symbols, channel_bound, ?quirks, "resolved GSSAPI capabilities");
        Self {
            family,
            symbols,
            channel_bound,
            quirks,
        }
    }
    pub fn family(&self) -> EngineFamily {
        self.family
    }
    pub fn quirks(&self) -> &Quirks {
        &self.quirks
    }
    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }
    pub fn has_extension(&self, extension: Extension) -> bool {
        match extension {
            Extension::ChannelBindingSignalling => self.channel_bound,
            Extension::Localname => self.has_symbol(SYM_LOCALNAME),
            Extension::Krb5Identity => false,
            Extension::CredStore => [SYM_ACQUIRE_CRED_FROM, SYM_STORE_CRED_INTO, SYM_ADD_CRED_FROM]
                .iter()
                .all(|s| self.has_symbol(s)),
            Extension::InquireName => self.has_symbol(SYM_INQUIRE_NAME),
        }
    }
    /// Unknown codes answer false.
    pub fn has_extension_code(&self, code: u32) -> bool {
        Extension::from_code(code).is_some_and(|ext| self.has_extension(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn everything(_: &str) -> bool {
        true
    }

    #[test]
    fn modern_mit_has_everything_but_identity() {
        let caps = Capabilities::probe(EngineFamily::Mit, everything);
        assert!(caps.has_extension(Extension::ChannelBindingSignalling));
        assert!(caps.has_extension(Extension::Localname));
        assert!(caps.has_extension(Extension::CredStore));
        assert!(caps.has_extension(Extension::InquireName));
        assert!(!caps.has_extension(Extension::Krb5Identity));
        assert_eq!(*caps.quirks(), Quirks::default());
    }

    #[test]
    fn old_mit_lacks_channel_bound_signal() {
        let caps = Capabilities::probe(EngineFamily::Mit, |s| s != SYM_KRB5_NT_X509_CERT);
        assert!(!caps.has_extension(Extension::ChannelBindingSignalling));
    }

    #[test]
    fn cred_store_needs_all_three_symbols() {
        let caps = Capabilities::probe(EngineFamily::Mit, |s| s != SYM_ADD_CRED_FROM);
        assert!(!caps.has_extension(Extension::CredStore));
    }

    #[test]
    fn old_heimdal_quirks() {
        let caps = Capabilities::probe(EngineFamily::Heimdal, |s| s == SYM_HEIMDAL_REGISTER_ACCEPTOR);
        let quirks = caps.quirks();
        assert!(quirks.add_cred_defective);
        assert!(quirks.add_cred_requires_new_handle);
        assert!(quirks.misreports_cred_usage);
        assert!(!quirks.unstable_default_name);
        assert!(quirks.cannot_acquire_both_by_default);
        assert!(!caps.has_extension(Extension::ChannelBindingSignalling));
    }

    #[test]
    fn heimdal_7_default_names_are_unstable() {
        let caps = Capabilities::probe(EngineFamily::Heimdal, everything);
        assert!(caps.quirks().unstable_default_name);
        assert!(!caps.quirks().add_cred_defective);
        assert!(caps.has_extension(Extension::ChannelBindingSignalling));
    }

    #[test]
    fn apple_omits_context_mech() {
        let caps = Capabilities::probe(EngineFamily::Apple, everything);
        assert!(caps.quirks().omits_context_mech);
        assert!(!caps.has_extension(Extension::ChannelBindingSignalling));
    }

    #[test]
    fn unknown_extension_codes_answer_false() {
        let caps = Capabilities::probe(EngineFamily::Mit, everything);
        assert!(caps.has_extension_code(Extension::Localname.code()));
        assert!(!caps.has_extension_code(99));
        assert!(!caps.has_extension_code(u32::MAX));
    }
}

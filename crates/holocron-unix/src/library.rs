use std::{
    ffi::{c_int, c_void},
    path::Path,
};

use holocron_core::{
    capability::{Capabilities, EngineFamily, SYM_HEIMDAL_REGISTER_ACCEPTOR},
    Extension,
};
use libloading::Library;

use crate::{config::EngineConfig, error::LoadError, ffi::*};

macro_rules! functions {
    (
        required { $($req:ident($($rarg:ty),* $(,)?);)* }
        optional { $($opt:ident($($oarg:ty),* $(,)?);)* }
    ) => {
        /// Entry points resolved from the loaded library. Valid while the [`Library`] lives.
        pub(crate) struct Functions {
            $(pub $req: unsafe extern "C" fn(*mut OM_uint32, $($rarg),*) -> OM_uint32,)*
            $(pub $opt: Option<unsafe extern "C" fn(*mut OM_uint32, $($oarg),*) -> OM_uint32>,)*
        }

        impl Functions {
            unsafe fn resolve(library: &Library) -> Result<Self, (&'static str, libloading::Error)> {
                Ok(Self {
                    $($req: *library
                        .get::<unsafe extern "C" fn(*mut OM_uint32, $($rarg),*) -> OM_uint32>(
                            concat!(stringify!($req), "\0").as_bytes(),
                        )
                        .map_err(|e| (stringify!($req), e))?,)*
                    $($opt: library
                        .get::<unsafe extern "C" fn(*mut OM_uint32, $($oarg),*) -> OM_uint32>(
                            concat!(stringify!($opt), "\0").as_bytes(),
                        )
                        .ok()
                        .map(|symbol| *symbol),)*
                })
            }
        }
    };
}

functions! {
    required {
        gss_release_buffer(gss_buffer_t);
        gss_release_oid_set(*mut gss_OID_set);
        gss_display_status(OM_uint32, c_int, gss_OID, *mut OM_uint32, gss_buffer_t);
        gss_import_name(gss_buffer_t, gss_OID, *mut gss_name_t);
        gss_release_name(*mut gss_name_t);
        gss_display_name(gss_name_t, gss_buffer_t, *mut gss_OID);
        gss_compare_name(gss_name_t, gss_name_t, *mut c_int);
        gss_canonicalize_name(gss_name_t, gss_OID, *mut gss_name_t);
        gss_export_name(gss_name_t, gss_buffer_t);
        gss_duplicate_name(gss_name_t, *mut gss_name_t);
        gss_inquire_mechs_for_name(gss_name_t, *mut gss_OID_set);
        gss_inquire_names_for_mech(gss_OID, *mut gss_OID_set);
        gss_indicate_mechs(*mut gss_OID_set);
        gss_acquire_cred(
            gss_name_t,
            OM_uint32,
            gss_OID_set,
            gss_cred_usage_t,
            *mut gss_cred_id_t,
            *mut gss_OID_set,
            *mut OM_uint32,
        );
        gss_release_cred(*mut gss_cred_id_t);
        gss_inquire_cred(gss_cred_id_t, *mut gss_name_t, *mut OM_uint32, *mut gss_cred_usage_t, *mut gss_OID_set);
        gss_inquire_cred_by_mech(
            gss_cred_id_t,
            gss_OID,
            *mut gss_name_t,
            *mut OM_uint32,
            *mut OM_uint32,
            *mut gss_cred_usage_t,
        );
        gss_add_cred(
            gss_cred_id_t,
            gss_name_t,
            gss_OID,
            gss_cred_usage_t,
            OM_uint32,
            OM_uint32,
            *mut gss_cred_id_t,
            *mut gss_OID_set,
            *mut OM_uint32,
            *mut OM_uint32,
        );
        gss_init_sec_context(
            gss_cred_id_t,
            *mut gss_ctx_id_t,
            gss_name_t,
            gss_OID,
            OM_uint32,
            OM_uint32,
            gss_channel_bindings_t,
            gss_buffer_t,
            *mut gss_OID,
            gss_buffer_t,
            *mut OM_uint32,
            *mut OM_uint32,
        );
        gss_accept_sec_context(
            *mut gss_ctx_id_t,
            gss_cred_id_t,
            gss_buffer_t,
            gss_channel_bindings_t,
            *mut gss_name_t,
            *mut gss_OID,
            gss_buffer_t,
            *mut OM_uint32,
            *mut OM_uint32,
            *mut gss_cred_id_t,
        );
        gss_delete_sec_context(*mut gss_ctx_id_t, gss_buffer_t);
        gss_process_context_token(gss_ctx_id_t, gss_buffer_t);
        gss_context_time(gss_ctx_id_t, *mut OM_uint32);
        gss_inquire_context(
            gss_ctx_id_t,
            *mut gss_name_t,
            *mut gss_name_t,
            *mut OM_uint32,
            *mut gss_OID,
            *mut OM_uint32,
            *mut c_int,
            *mut c_int,
        );
        gss_wrap_size_limit(gss_ctx_id_t, c_int, gss_qop_t, OM_uint32, *mut OM_uint32);
        gss_export_sec_context(*mut gss_ctx_id_t, gss_buffer_t);
        gss_import_sec_context(gss_buffer_t, *mut gss_ctx_id_t);
        gss_wrap(gss_ctx_id_t, c_int, gss_qop_t, gss_buffer_t, *mut c_int, gss_buffer_t);
        gss_unwrap(gss_ctx_id_t, gss_buffer_t, gss_buffer_t, *mut c_int, *mut gss_qop_t);
        gss_get_mic(gss_ctx_id_t, gss_qop_t, gss_buffer_t, gss_buffer_t);
        gss_verify_mic(gss_ctx_id_t, gss_buffer_t, gss_buffer_t, *mut gss_qop_t);
    }
    optional {
        gss_localname(gss_name_t, gss_OID, gss_buffer_t);
        gss_inquire_name(gss_name_t, *mut c_int, *mut gss_OID, *mut gss_buffer_set_t);
        gss_release_buffer_set(*mut gss_buffer_set_t);
        gss_acquire_cred_from(
            gss_name_t,
            OM_uint32,
            gss_OID_set,
            gss_cred_usage_t,
            gss_const_key_value_set_t,
            *mut gss_cred_id_t,
            *mut gss_OID_set,
            *mut OM_uint32,
        );
        gss_add_cred_from(
            gss_cred_id_t,
            gss_name_t,
            gss_OID,
            gss_cred_usage_t,
            OM_uint32,
            OM_uint32,
            gss_const_key_value_set_t,
            *mut gss_cred_id_t,
            *mut gss_OID_set,
            *mut OM_uint32,
            *mut OM_uint32,
        );
        gss_store_cred_into(
            gss_cred_id_t,
            gss_cred_usage_t,
            gss_OID,
            OM_uint32,
            OM_uint32,
            gss_const_key_value_set_t,
            *mut gss_OID_set,
            *mut gss_cred_usage_t,
        );
    }
}

/// A loaded GSSAPI library with its entry points and probed capabilities.
pub(crate) struct Loaded {
    pub functions: Functions,
    pub capabilities: Capabilities,
    pub path: String,
    _library: Library,
}

pub(crate) fn load(config: &EngineConfig) -> Result<Loaded, LoadError> {
    let candidates = config.candidates();
    let mut last = None;
    for candidate in &candidates {
        // SAFETY: loading a GSSAPI library runs only its (and krb5's) initialisers
        match unsafe { Library::new(candidate) } {
            Ok(library) => return open(library, candidate),
            Err(source) => {
                tracing::debug!(library = %candidate.display(), %source, "GSSAPI library candidate did not load");
                last = Some(source);
            }
        }
    }
    match (candidates.as_slice(), last) {
        ([only], Some(source)) => Err(LoadError::Open {
            path: only.display().to_string(),
            source,
        }),
        _ => Err(LoadError::NotFound {
            tried: candidates.iter().map(|c| c.display().to_string()).collect(),
        }),
    }
}

fn open(library: Library, path: &Path) -> Result<Loaded, LoadError> {
    let path = path.display().to_string();
    // SAFETY: every signature above is the RFC 2744 prototype of the symbol it is resolved from
    let functions = unsafe { Functions::resolve(&library) }.map_err(|(symbol, source)| LoadError::MissingSymbol {
        path: path.clone(),
        symbol,
        source,
    })?;
    let has_symbol = |symbol: &str| {
        let mut name = symbol.as_bytes().to_vec();
        name.push(0);
        // SAFETY: the symbol is only checked for presence, never called through this type
        unsafe { library.get::<*const c_void>(&name) }.is_ok()
    };
    let family = detect_family(&path, &has_symbol);
    let capabilities = Capabilities::probe(family, has_symbol);
    tracing::debug!(
        library = %path,
        %family,
        cred_store = capabilities.has_extension(Extension::CredStore),
        "loaded GSSAPI library"
    );
    Ok(Loaded {
        functions,
        capabilities,
        path,
        _library: library,
    })
}

fn detect_family(path: &str, has_symbol: impl Fn(&str) -> bool) -> EngineFamily {
    if path.contains("GSS.framework") {
        EngineFamily::Apple
    } else if has_symbol(SYM_HEIMDAL_REGISTER_ACCEPTOR) {
        EngineFamily::Heimdal
    } else {
        EngineFamily::Mit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_follows_library_and_symbols() {
        let none = |_: &str| false;
        let heimdal = |symbol: &str| symbol == SYM_HEIMDAL_REGISTER_ACCEPTOR;
        assert_eq!(detect_family("libgssapi_krb5.so.2", none), EngineFamily::Mit);
        assert_eq!(detect_family("libgssapi.so.3", heimdal), EngineFamily::Heimdal);
        assert_eq!(
            detect_family("/System/Library/Frameworks/GSS.framework/GSS", heimdal),
            EngineFamily::Apple
        );
    }

    #[test]
    fn missing_library_reports_what_was_tried() {
        let config = EngineConfig {
            library: Some("/nonexistent/libgssapi_holocron.so".into()),
        };
        match load(&config) {
            Err(LoadError::Open { path, .. }) => assert_eq!(path, "/nonexistent/libgssapi_holocron.so"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("a nonexistent library loaded"),
        }
    }
}

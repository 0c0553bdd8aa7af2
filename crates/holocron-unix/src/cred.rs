use std::{ptr, ptr::NonNull};

use holocron_core::{
    engine::{AcquireRequest, AddCredRequest, EngineResult, RawCredInfo, StoreRequest, StoredElements},
    CredUsage, Oid, RawStatus, RoutineError,
};

use crate::{
    buffer::KeyValueSet,
    ffi::{gss_cred_id_struct, gss_cred_id_t, gss_cred_usage_t, OM_uint32},
    library::Functions,
    name::{OutName, UnixName},
    oid::{oid_ptr, OidRef, OidSetRef, OwnedOidSet},
    status::{check, NULL_HANDLE, UNAVAILABLE},
    UnixEngine,
};

pub struct UnixCred(NonNull<gss_cred_id_struct>);
// Credentials are shared between contexts on different threads; the libraries lock internally.
unsafe impl Send for UnixCred {}
unsafe impl Sync for UnixCred {}

impl UnixCred {
    pub(crate) fn as_ptr(&self) -> gss_cred_id_t {
        self.0.as_ptr()
    }
}

/// An output credential slot, released on drop unless taken.
pub(crate) struct OutCred<'f> {
    raw: gss_cred_id_t,
    functions: &'f Functions,
}

impl<'f> OutCred<'f> {
    pub fn new(functions: &'f Functions) -> Self {
        Self {
            raw: ptr::null_mut(),
            functions,
        }
    }
    pub fn as_mut_ptr(&mut self) -> *mut gss_cred_id_t {
        &mut self.raw
    }
    pub fn take(mut self) -> Option<UnixCred> {
        NonNull::new(std::mem::replace(&mut self.raw, ptr::null_mut())).map(UnixCred)
    }
}

impl Drop for OutCred<'_> {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            let mut minor = 0;
            unsafe { (self.functions.gss_release_cred)(&mut minor, &mut self.raw) };
        }
    }
}

fn usage_from_raw(raw: gss_cred_usage_t) -> EngineResult<CredUsage> {
    CredUsage::from_raw(raw).ok_or(RawStatus::routine(RoutineError::Failure))
}

pub(crate) fn acquire(f: &Functions, request: AcquireRequest<'_, UnixEngine>) -> EngineResult<UnixCred> {
    let mut minor = 0;
    let name = request.name.map_or(ptr::null_mut(), UnixName::as_ptr);
    let mut mechs = OidSetRef::new(request.mechs);
    let mut out = OutCred::new(f);
    let major = match request.store {
        None => unsafe {
            (f.gss_acquire_cred)(
                &mut minor,
                name,
                request.time_req,
                mechs.as_ptr(),
                request.usage.to_raw(),
                out.as_mut_ptr(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        },
        Some(store) => {
            let acquire_cred_from = f.gss_acquire_cred_from.ok_or(UNAVAILABLE)?;
            let store = KeyValueSet::new(store)?;
            unsafe {
                acquire_cred_from(
                    &mut minor,
                    name,
                    request.time_req,
                    mechs.as_ptr(),
                    request.usage.to_raw(),
                    store.as_ptr(),
                    out.as_mut_ptr(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            }
        }
    };
    check(major, minor)?;
    out.take().ok_or(NULL_HANDLE)
}

pub(crate) fn release(f: &Functions, cred: UnixCred) -> EngineResult<()> {
    let mut minor = 0;
    let mut raw = cred.as_ptr();
    let major = unsafe { (f.gss_release_cred)(&mut minor, &mut raw) };
    tracing::trace!("released GSSAPI credential");
    check(major, minor).map(drop)
}

pub(crate) fn inquire(f: &Functions, cred: &UnixCred) -> EngineResult<RawCredInfo<UnixName>> {
    let mut minor = 0;
    let mut name = OutName::new(f);
    let mut lifetime: OM_uint32 = 0;
    let mut usage: gss_cred_usage_t = 0;
    let mut mechs = OwnedOidSet::new(f);
    let major = unsafe {
        (f.gss_inquire_cred)(
            &mut minor,
            cred.as_ptr(),
            name.as_mut_ptr(),
            &mut lifetime,
            &mut usage,
            mechs.as_mut_ptr(),
        )
    };
    check(major, minor)?;
    let usage = usage_from_raw(usage)?;
    Ok(RawCredInfo {
        name: name.take(),
        usage,
        initiator_lifetime: lifetime,
        acceptor_lifetime: lifetime,
        mechs: mechs.to_oid_set(),
    })
}

pub(crate) fn inquire_by_mech(f: &Functions, cred: &UnixCred, mech: &Oid) -> EngineResult<RawCredInfo<UnixName>> {
    let mut minor = 0;
    let mut mech_ref = OidRef::new(mech);
    let mut name = OutName::new(f);
    let mut initiator_lifetime: OM_uint32 = 0;
    let mut acceptor_lifetime: OM_uint32 = 0;
    let mut usage: gss_cred_usage_t = 0;
    let major = unsafe {
        (f.gss_inquire_cred_by_mech)(
            &mut minor,
            cred.as_ptr(),
            mech_ref.as_ptr(),
            name.as_mut_ptr(),
            &mut initiator_lifetime,
            &mut acceptor_lifetime,
            &mut usage,
        )
    };
    check(major, minor)?;
    let usage = usage_from_raw(usage)?;
    Ok(RawCredInfo {
        name: name.take(),
        usage,
        initiator_lifetime,
        acceptor_lifetime,
        mechs: [mech.clone()].into_iter().collect(),
    })
}

pub(crate) fn add(
    f: &Functions,
    cred: &UnixCred,
    request: AddCredRequest<'_, UnixEngine>,
    new_handle: bool,
) -> EngineResult<Option<UnixCred>> {
    let mut minor = 0;
    let name = request.name.map_or(ptr::null_mut(), UnixName::as_ptr);
    let mut mech = OidRef::new(request.mech);
    let mut out = OutCred::new(f);
    // A null output handle asks the library to extend the input credential in place.
    let out_ptr = if new_handle {
        out.as_mut_ptr()
    } else {
        ptr::null_mut()
    };
    let major = match request.store {
        None => unsafe {
            (f.gss_add_cred)(
                &mut minor,
                cred.as_ptr(),
                name,
                mech.as_ptr(),
                request.usage.to_raw(),
                request.initiator_time_req,
                request.acceptor_time_req,
                out_ptr,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        },
        Some(store) => {
            let add_cred_from = f.gss_add_cred_from.ok_or(UNAVAILABLE)?;
            let store = KeyValueSet::new(store)?;
            unsafe {
                add_cred_from(
                    &mut minor,
                    cred.as_ptr(),
                    name,
                    mech.as_ptr(),
                    request.usage.to_raw(),
                    request.initiator_time_req,
                    request.acceptor_time_req,
                    store.as_ptr(),
                    out_ptr,
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            }
        }
    };
    check(major, minor)?;
    if new_handle {
        out.take().ok_or(NULL_HANDLE).map(Some)
    } else {
        Ok(None)
    }
}

pub(crate) fn store(f: &Functions, cred: &UnixCred, request: StoreRequest<'_>) -> EngineResult<StoredElements> {
    let store_cred_into = f.gss_store_cred_into.ok_or(UNAVAILABLE)?;
    let mut minor = 0;
    let mut mech = request.mech.map(OidRef::new);
    let store = KeyValueSet::new(request.store)?;
    let mut stored = OwnedOidSet::new(f);
    let mut usage: gss_cred_usage_t = 0;
    let major = unsafe {
        store_cred_into(
            &mut minor,
            cred.as_ptr(),
            request.usage.to_raw(),
            oid_ptr(mech.as_mut()),
            request.overwrite.into(),
            request.default.into(),
            store.as_ptr(),
            stored.as_mut_ptr(),
            &mut usage,
        )
    };
    check(major, minor)?;
    Ok(StoredElements {
        mechs: stored.to_oid_set(),
        usage: usage_from_raw(usage)?,
    })
}

use std::{ffi::c_int, ptr, ptr::NonNull};

use holocron_core::{
    engine::{EngineResult, RawNameInfo},
    Oid, OidSet,
};

use crate::{
    buffer::{InputBuffer, OwnedBuffer, OwnedBufferSet},
    ffi::{gss_name_struct, gss_name_t},
    library::Functions,
    oid::{self, OidRef, OwnedOidSet},
    status::{check, NULL_HANDLE, UNAVAILABLE},
};

pub struct UnixName(NonNull<gss_name_struct>);
// The handle is only reached through `&self`/`self` engine calls, and the libraries lock internally.
unsafe impl Send for UnixName {}
unsafe impl Sync for UnixName {}

impl UnixName {
    pub(crate) fn as_ptr(&self) -> gss_name_t {
        self.0.as_ptr()
    }
}

/// An output name slot. Anything the library put there is released unless taken.
pub(crate) struct OutName<'f> {
    raw: gss_name_t,
    functions: &'f Functions,
}

impl<'f> OutName<'f> {
    pub fn new(functions: &'f Functions) -> Self {
        Self {
            raw: ptr::null_mut(),
            functions,
        }
    }
    pub fn as_mut_ptr(&mut self) -> *mut gss_name_t {
        &mut self.raw
    }
    pub fn take(mut self) -> Option<UnixName> {
        NonNull::new(std::mem::replace(&mut self.raw, ptr::null_mut())).map(UnixName)
    }
    pub fn take_required(self) -> EngineResult<UnixName> {
        self.take().ok_or(NULL_HANDLE)
    }
}

impl Drop for OutName<'_> {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            let mut minor = 0;
            unsafe { (self.functions.gss_release_name)(&mut minor, &mut self.raw) };
        }
    }
}

pub(crate) fn import(f: &Functions, name: &[u8], name_type: &Oid) -> EngineResult<UnixName> {
    let mut minor = 0;
    let mut input = InputBuffer::new(name);
    let mut name_type = OidRef::new(name_type);
    let mut out = OutName::new(f);
    let major = unsafe { (f.gss_import_name)(&mut minor, input.as_ptr(), name_type.as_ptr(), out.as_mut_ptr()) };
    check(major, minor)?;
    out.take_required()
}

pub(crate) fn release(f: &Functions, name: UnixName) -> EngineResult<()> {
    let mut minor = 0;
    let mut raw = name.as_ptr();
    let major = unsafe { (f.gss_release_name)(&mut minor, &mut raw) };
    tracing::trace!("released GSSAPI name");
    check(major, minor).map(drop)
}

pub(crate) fn display(f: &Functions, name: &UnixName) -> EngineResult<(Vec<u8>, Option<Oid>)> {
    let mut minor = 0;
    let mut buffer = OwnedBuffer::new(f);
    let mut name_type = ptr::null_mut();
    let major = unsafe { (f.gss_display_name)(&mut minor, name.as_ptr(), buffer.as_mut_ptr(), &mut name_type) };
    check(major, minor)?;
    Ok((buffer.to_vec(), oid::from_raw(name_type)))
}

pub(crate) fn compare(f: &Functions, a: &UnixName, b: &UnixName) -> EngineResult<bool> {
    let mut minor = 0;
    let mut equal: c_int = 0;
    let major = unsafe { (f.gss_compare_name)(&mut minor, a.as_ptr(), b.as_ptr(), &mut equal) };
    check(major, minor)?;
    Ok(equal != 0)
}

pub(crate) fn canonicalize(f: &Functions, name: &UnixName, mech: &Oid) -> EngineResult<UnixName> {
    let mut minor = 0;
    let mut mech = OidRef::new(mech);
    let mut out = OutName::new(f);
    let major = unsafe { (f.gss_canonicalize_name)(&mut minor, name.as_ptr(), mech.as_ptr(), out.as_mut_ptr()) };
    check(major, minor)?;
    out.take_required()
}

pub(crate) fn export(f: &Functions, name: &UnixName) -> EngineResult<Vec<u8>> {
    let mut minor = 0;
    let mut buffer = OwnedBuffer::new(f);
    let major = unsafe { (f.gss_export_name)(&mut minor, name.as_ptr(), buffer.as_mut_ptr()) };
    check(major, minor)?;
    Ok(buffer.to_vec())
}

pub(crate) fn duplicate(f: &Functions, name: &UnixName) -> EngineResult<UnixName> {
    let mut minor = 0;
    let mut out = OutName::new(f);
    let major = unsafe { (f.gss_duplicate_name)(&mut minor, name.as_ptr(), out.as_mut_ptr()) };
    check(major, minor)?;
    out.take_required()
}

pub(crate) fn mechs_for_name(f: &Functions, name: &UnixName) -> EngineResult<OidSet> {
    let mut minor = 0;
    let mut mechs = OwnedOidSet::new(f);
    let major = unsafe { (f.gss_inquire_mechs_for_name)(&mut minor, name.as_ptr(), mechs.as_mut_ptr()) };
    check(major, minor)?;
    Ok(mechs.to_oid_set())
}

pub(crate) fn names_for_mech(f: &Functions, mech: &Oid) -> EngineResult<OidSet> {
    let mut minor = 0;
    let mut mech = OidRef::new(mech);
    let mut name_types = OwnedOidSet::new(f);
    let major = unsafe { (f.gss_inquire_names_for_mech)(&mut minor, mech.as_ptr(), name_types.as_mut_ptr()) };
    check(major, minor)?;
    Ok(name_types.to_oid_set())
}

pub(crate) fn indicate_mechs(f: &Functions) -> EngineResult<OidSet> {
    let mut minor = 0;
    let mut mechs = OwnedOidSet::new(f);
    let major = unsafe { (f.gss_indicate_mechs)(&mut minor, mechs.as_mut_ptr()) };
    check(major, minor)?;
    Ok(mechs.to_oid_set())
}

pub(crate) fn localname(f: &Functions, name: &UnixName, mech: &Oid) -> EngineResult<Vec<u8>> {
    let localname = f.gss_localname.ok_or(UNAVAILABLE)?;
    let mut minor = 0;
    let mut mech = OidRef::new(mech);
    let mut buffer = OwnedBuffer::new(f);
    let major = unsafe { localname(&mut minor, name.as_ptr(), mech.as_ptr(), buffer.as_mut_ptr()) };
    check(major, minor)?;
    Ok(buffer.to_vec())
}

pub(crate) fn inquire(f: &Functions, name: &UnixName) -> EngineResult<RawNameInfo> {
    let inquire_name = f.gss_inquire_name.ok_or(UNAVAILABLE)?;
    let mut minor = 0;
    let mut is_mechanism_name: c_int = 0;
    let mut mech = ptr::null_mut();
    let mut attributes = OwnedBufferSet::new(f);
    let major = unsafe {
        inquire_name(
            &mut minor,
            name.as_ptr(),
            &mut is_mechanism_name,
            &mut mech,
            attributes.as_mut_ptr(),
        )
    };
    check(major, minor)?;
    Ok(RawNameInfo {
        is_mechanism_name: is_mechanism_name != 0,
        mech: oid::from_raw(mech),
        attributes: attributes.to_vecs(),
    })
}

use std::{ffi::c_void, marker::PhantomData, ptr};

use holocron_core::{Oid, OidSet};

use crate::{ffi::*, library::Functions};

/// A `gss_OID_desc` borrowing the DER bytes of an [`Oid`].
pub(crate) struct OidRef<'a> {
    desc: gss_OID_desc,
    _oid: PhantomData<&'a Oid>,
}

impl<'a> OidRef<'a> {
    pub fn new(oid: &'a Oid) -> Self {
        Self {
            desc: desc(oid),
            _oid: PhantomData,
        }
    }
    pub fn as_ptr(&mut self) -> gss_OID {
        &mut self.desc
    }
}

pub(crate) fn oid_ptr(oid: Option<&mut OidRef<'_>>) -> gss_OID {
    oid.map_or(ptr::null_mut(), OidRef::as_ptr)
}

fn desc(oid: &Oid) -> gss_OID_desc {
    gss_OID_desc {
        length: oid.as_bytes().len() as OM_uint32,
        elements: oid.as_bytes().as_ptr() as *mut c_void,
    }
}

/// A `gss_OID_set_desc` over an [`OidSet`]. Empty sets become `GSS_C_NO_OID_SET`.
pub(crate) struct OidSetRef<'a> {
    descs: Vec<gss_OID_desc>,
    set: gss_OID_set_desc,
    _oids: PhantomData<&'a OidSet>,
}

impl<'a> OidSetRef<'a> {
    pub fn new(oids: &'a OidSet) -> Self {
        let mut descs: Vec<_> = oids.iter().map(desc).collect();
        let set = gss_OID_set_desc {
            count: descs.len(),
            elements: descs.as_mut_ptr(),
        };
        Self {
            descs,
            set,
            _oids: PhantomData,
        }
    }
    pub fn as_ptr(&mut self) -> gss_OID_set {
        if self.descs.is_empty() {
            ptr::null_mut()
        } else {
            &mut self.set
        }
    }
}

/// Copies a library-owned OID. Static OIDs are never released.
pub(crate) fn from_raw(oid: gss_OID) -> Option<Oid> {
    if oid.is_null() {
        return None;
    }
    // SAFETY: non-null OIDs returned by the library point at a valid descriptor
    let desc = unsafe { ptr::read_unaligned(oid) };
    let (length, elements) = (desc.length, desc.elements);
    if elements.is_null() || length == 0 {
        return None;
    }
    let der = unsafe { std::slice::from_raw_parts(elements as *const u8, length as usize) };
    match Oid::from_der(der) {
        Ok(oid) => Some(oid),
        Err(error) => {
            tracing::warn!(%error, "library returned a malformed OID");
            None
        }
    }
}

/// A `gss_OID_set` allocated by the library.
pub(crate) struct OwnedOidSet<'f> {
    set: gss_OID_set,
    functions: &'f Functions,
}

impl<'f> OwnedOidSet<'f> {
    pub fn new(functions: &'f Functions) -> Self {
        Self {
            set: ptr::null_mut(),
            functions,
        }
    }
    pub fn as_mut_ptr(&mut self) -> *mut gss_OID_set {
        &mut self.set
    }
    pub fn to_oid_set(&self) -> OidSet {
        if self.set.is_null() {
            return OidSet::new();
        }
        // SAFETY: a non-null set holds `count` descriptors
        let set = unsafe { &*self.set };
        (0..set.count)
            .filter_map(|i| from_raw(unsafe { set.elements.add(i) }))
            .collect()
    }
}

impl Drop for OwnedOidSet<'_> {
    fn drop(&mut self) {
        if self.set.is_null() {
            return;
        }
        let mut minor = 0;
        unsafe { (self.functions.gss_release_oid_set)(&mut minor, &mut self.set) };
    }
}

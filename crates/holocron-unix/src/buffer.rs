//! Descriptors handed to the library. Inputs borrow Rust memory for the length of one call;
//! outputs own library memory and give it back on drop.

use std::{
    ffi::{c_void, CString},
    marker::PhantomData,
    ptr,
};

use holocron_core::{
    engine::EngineResult, CallingError, ChannelBinding, CredStore, RawStatus, RoutineError,
};

use crate::{ffi::*, library::Functions};

pub(crate) struct InputBuffer<'a> {
    desc: gss_buffer_desc,
    _data: PhantomData<&'a [u8]>,
}

impl<'a> InputBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            desc: gss_buffer_desc {
                length: data.len(),
                value: if data.is_empty() {
                    ptr::null_mut()
                } else {
                    data.as_ptr() as *mut c_void
                },
            },
            _data: PhantomData,
        }
    }
    /// The library takes inputs through mutable pointers but never writes to them.
    pub fn as_ptr(&mut self) -> gss_buffer_t {
        &mut self.desc
    }
}

pub(crate) struct OwnedBuffer<'f> {
    desc: gss_buffer_desc,
    functions: &'f Functions,
}

impl<'f> OwnedBuffer<'f> {
    pub fn new(functions: &'f Functions) -> Self {
        Self {
            desc: gss_buffer_desc {
                length: 0,
                value: ptr::null_mut(),
            },
            functions,
        }
    }
    pub fn as_mut_ptr(&mut self) -> gss_buffer_t {
        &mut self.desc
    }
    pub fn as_slice(&self) -> &[u8] {
        if self.desc.value.is_null() || self.desc.length == 0 {
            return &[];
        }
        // SAFETY: the library filled in a buffer of `length` bytes that lives until released
        unsafe { std::slice::from_raw_parts(self.desc.value as *const u8, self.desc.length) }
    }
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl Drop for OwnedBuffer<'_> {
    fn drop(&mut self) {
        if self.desc.value.is_null() {
            return;
        }
        let mut minor = 0;
        unsafe { (self.functions.gss_release_buffer)(&mut minor, &mut self.desc) };
    }
}

/// A `gss_buffer_set_t` as returned by `gss_inquire_name`.
pub(crate) struct OwnedBufferSet<'f> {
    set: gss_buffer_set_t,
    functions: &'f Functions,
}

impl<'f> OwnedBufferSet<'f> {
    pub fn new(functions: &'f Functions) -> Self {
        Self {
            set: ptr::null_mut(),
            functions,
        }
    }
    pub fn as_mut_ptr(&mut self) -> *mut gss_buffer_set_t {
        &mut self.set
    }
    pub fn to_vecs(&self) -> Vec<Vec<u8>> {
        if self.set.is_null() {
            return Vec::new();
        }
        // SAFETY: a non-null set holds `count` buffer descriptors
        let set = unsafe { &*self.set };
        if set.elements.is_null() {
            return Vec::new();
        }
        let elements = unsafe { std::slice::from_raw_parts(set.elements, set.count) };
        elements
            .iter()
            .map(|desc| {
                if desc.value.is_null() {
                    Vec::new()
                } else {
                    unsafe { std::slice::from_raw_parts(desc.value as *const u8, desc.length) }.to_vec()
                }
            })
            .collect()
    }
}

impl Drop for OwnedBufferSet<'_> {
    fn drop(&mut self) {
        if self.set.is_null() {
            return;
        }
        let Some(release) = self.functions.gss_release_buffer_set else {
            tracing::warn!("library returned a buffer set without gss_release_buffer_set, leaking it");
            return;
        };
        let mut minor = 0;
        unsafe { release(&mut minor, &mut self.set) };
    }
}

/// `gss_channel_bindings_struct` over a [`ChannelBinding`].
pub(crate) struct BindingsRef<'a> {
    _initiator: Vec<u8>,
    _acceptor: Vec<u8>,
    desc: gss_channel_bindings_struct,
    _data: PhantomData<&'a ChannelBinding>,
}

impl<'a> BindingsRef<'a> {
    pub fn new(bindings: &'a ChannelBinding) -> Self {
        let (initiator_addrtype, initiator) = bindings.initiator_parts();
        let (acceptor_addrtype, acceptor) = bindings.acceptor_parts();
        let desc = gss_channel_bindings_struct {
            initiator_addrtype,
            initiator_address: borrowed(&initiator),
            acceptor_addrtype,
            acceptor_address: borrowed(&acceptor),
            application_data: borrowed(&bindings.data),
        };
        Self {
            _initiator: initiator,
            _acceptor: acceptor,
            desc,
            _data: PhantomData,
        }
    }
    pub fn as_ptr(&mut self) -> gss_channel_bindings_t {
        &mut self.desc
    }
}

/// Moving the owning `Vec` afterwards keeps the heap pointer valid.
fn borrowed(data: &[u8]) -> gss_buffer_desc {
    gss_buffer_desc {
        length: data.len(),
        value: if data.is_empty() {
            ptr::null_mut()
        } else {
            data.as_ptr() as *mut c_void
        },
    }
}

/// `gss_key_value_set_desc` over a [`CredStore`].
pub(crate) struct KeyValueSet {
    _strings: Vec<(CString, CString)>,
    _elements: Vec<gss_key_value_element_desc>,
    desc: gss_key_value_set_desc,
}

impl KeyValueSet {
    pub fn new(store: &CredStore) -> EngineResult<Self> {
        let strings = store
            .iter()
            .map(|(key, value)| Ok((CString::new(key.as_str())?, CString::new(value)?)))
            .collect::<Result<Vec<_>, std::ffi::NulError>>()
            .map_err(|_| RawStatus::calling(CallingError::BadStructure, RoutineError::Failure))?;
        let mut elements: Vec<_> = strings
            .iter()
            .map(|(key, value)| gss_key_value_element_desc {
                key: key.as_ptr(),
                value: value.as_ptr(),
            })
            .collect();
        let desc = gss_key_value_set_desc {
            count: elements.len() as OM_uint32,
            elements: elements.as_mut_ptr(),
        };
        Ok(Self {
            _strings: strings,
            _elements: elements,
            desc,
        })
    }
    pub fn as_ptr(&self) -> gss_const_key_value_set_t {
        &self.desc
    }
}

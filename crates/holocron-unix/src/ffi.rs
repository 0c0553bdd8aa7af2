//! RFC 2744 C bindings, declared by hand so the library can be loaded at runtime.
#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_int, c_void};

pub type OM_uint32 = u32;
pub type gss_qop_t = OM_uint32;
pub type gss_cred_usage_t = c_int;

pub const GSS_C_GSS_CODE: c_int = 1;
pub const GSS_C_MECH_CODE: c_int = 2;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct gss_buffer_desc {
    pub length: usize,
    pub value: *mut c_void,
}
pub type gss_buffer_t = *mut gss_buffer_desc;

// GSS.framework declares these under `#pragma pack(push, 2)`.
#[cfg_attr(target_os = "macos", repr(C, packed(2)))]
#[cfg_attr(not(target_os = "macos"), repr(C))]
#[derive(Clone, Copy)]
pub struct gss_OID_desc {
    pub length: OM_uint32,
    pub elements: *mut c_void,
}
pub type gss_OID = *mut gss_OID_desc;

#[repr(C)]
pub struct gss_OID_set_desc {
    pub count: usize,
    pub elements: gss_OID,
}
pub type gss_OID_set = *mut gss_OID_set_desc;

#[repr(C)]
pub struct gss_buffer_set_desc {
    pub count: usize,
    pub elements: *mut gss_buffer_desc,
}
pub type gss_buffer_set_t = *mut gss_buffer_set_desc;

#[cfg_attr(target_os = "macos", repr(C, packed(2)))]
#[cfg_attr(not(target_os = "macos"), repr(C))]
pub struct gss_channel_bindings_struct {
    pub initiator_addrtype: OM_uint32,
    pub initiator_address: gss_buffer_desc,
    pub acceptor_addrtype: OM_uint32,
    pub acceptor_address: gss_buffer_desc,
    pub application_data: gss_buffer_desc,
}
pub type gss_channel_bindings_t = *mut gss_channel_bindings_struct;

#[repr(C)]
pub struct gss_key_value_element_desc {
    pub key: *const c_char,
    pub value: *const c_char,
}

#[repr(C)]
pub struct gss_key_value_set_desc {
    pub count: OM_uint32,
    pub elements: *mut gss_key_value_element_desc,
}
pub type gss_const_key_value_set_t = *const gss_key_value_set_desc;

#[repr(C)]
pub struct gss_name_struct {
    _private: [u8; 0],
}
pub type gss_name_t = *mut gss_name_struct;

#[repr(C)]
pub struct gss_cred_id_struct {
    _private: [u8; 0],
}
pub type gss_cred_id_t = *mut gss_cred_id_struct;

#[repr(C)]
pub struct gss_ctx_id_struct {
    _private: [u8; 0],
}
pub type gss_ctx_id_t = *mut gss_ctx_id_struct;

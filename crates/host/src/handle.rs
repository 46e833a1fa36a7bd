//! A safe-ish facade over the raw `pam_handle_t *`, plus an in-memory test
//! double so the dispatcher's per-tag logic can be exercised without a real
//! `libpam` loaded.

use std::ffi::{c_char, CStr, CString};
use std::os::raw::c_void;

use wire::{ConvMessage, ConvResponse, ItemValue, XAuthData};

use crate::pam_ffi::{self, pam_handle_t, pam_message, pam_response, pam_xauth_data};

/// Everything the dispatcher needs from a `pam_handle_t`, real or fake.
/// Every method returns the raw PAM return code the corresponding C call
/// would have produced, so the dispatcher can relay it over the wire
/// unchanged.
pub trait PamHandleOps {
    fn get_item(&self, item_type: i32) -> (i32, Option<ItemValue>);
    fn set_item(&mut self, item_type: i32, value: &ItemValue) -> i32;
    fn get_user(&mut self, prompt: Option<&[u8]>) -> (i32, Vec<u8>);
    fn fail_delay(&mut self, usec: i32) -> i32;
    fn strerror(&self, errnum: i32) -> Vec<u8>;
    fn syslog(&self, priority: i32, msg: &[u8]);
    fn converse(&self, messages: &[ConvMessage]) -> (i32, Option<Vec<ConvResponse>>);
    /// Installs this bridge's own terminal-based conversation callback
    /// (`conversation::default_conversation`) as `PAM_CONV`, so a policy
    /// script can prompt through the standard `converse()` RPC even when
    /// the host application never installed one of its own.
    fn install_default_conversation(&mut self) -> i32;
}

/// The C trampoline PAM actually calls. Marshals the C message array into
/// [`ConvMessage`]s, runs this crate's own default conversation
/// implementation, and marshals the responses back into a PAM-owned,
/// `malloc`-allocated response array — the allocation convention
/// `pam_conv` callbacks are required to follow, since the caller of
/// `->conv()` frees `*resp` itself.
extern "C" fn default_conv_trampoline(
    num_msg: std::os::raw::c_int,
    msg: *mut *const pam_message,
    resp: *mut *mut pam_response,
    _appdata_ptr: *mut c_void,
) -> std::os::raw::c_int {
    if num_msg <= 0 || msg.is_null() || resp.is_null() {
        return pam_ffi::PAM_CONV_ERR;
    }

    let messages: Vec<ConvMessage> = (0..num_msg as isize)
        .map(|i| unsafe {
            let message = &*(*msg.offset(i));
            let text = if message.msg.is_null() {
                Vec::new()
            } else {
                CStr::from_ptr(message.msg).to_bytes().to_vec()
            };
            ConvMessage {
                style: message.msg_style,
                text,
            }
        })
        .collect();

    match conversation::default_conversation(&messages) {
        Ok(responses) => {
            let count = responses.len();
            let array =
                unsafe { libc::calloc(count, std::mem::size_of::<pam_response>()) }.cast::<pam_response>();
            if array.is_null() {
                return pam_ffi::PAM_BUF_ERR;
            }
            for (i, response) in responses.into_iter().enumerate() {
                let resp_ptr = match response.text {
                    Some(text) => match CString::new(text) {
                        Ok(cstring) => {
                            let bytes = cstring.as_bytes_with_nul();
                            let buf = unsafe { libc::malloc(bytes.len()) }.cast::<c_char>();
                            if !buf.is_null() {
                                unsafe {
                                    std::ptr::copy_nonoverlapping(
                                        bytes.as_ptr(),
                                        buf.cast::<u8>(),
                                        bytes.len(),
                                    );
                                }
                            }
                            buf
                        }
                        Err(_) => std::ptr::null_mut(),
                    },
                    None => std::ptr::null_mut(),
                };
                unsafe {
                    let slot = array.add(i);
                    (*slot).resp = resp_ptr;
                    (*slot).resp_retcode = response.retcode;
                }
            }
            unsafe {
                *resp = array;
            }
            pam_ffi::PAM_SUCCESS
        }
        Err(_) => pam_ffi::PAM_CONV_ERR,
    }
}

/// Owns the real `pam_handle_t *` for the lifetime of one hook invocation.
/// The pointer is never freed here — PAM itself owns the handle's lifetime
/// across the whole service-module chain, not just this module's slice of
/// it.
pub struct RealPamHandle {
    raw: *mut pam_handle_t,
}

impl RealPamHandle {
    /// # Safety
    ///
    /// `raw` must be the live handle `libpam` passed into the hook that is
    /// currently running, and must outlive this value.
    #[must_use]
    pub const unsafe fn from_raw(raw: *mut pam_handle_t) -> Self {
        Self { raw }
    }
}

impl PamHandleOps for RealPamHandle {
    fn get_item(&self, item_type: i32) -> (i32, Option<ItemValue>) {
        let mut out: *const c_void = std::ptr::null();
        let retval = unsafe { pam_ffi::pam_get_item(self.raw, item_type, &mut out) };
        if retval != pam_ffi::PAM_SUCCESS || out.is_null() {
            return (retval, None);
        }

        if item_type == pam_ffi::PAM_XAUTHDATA {
            let xauth = out.cast::<pam_xauth_data>();
            let name = unsafe {
                std::slice::from_raw_parts((*xauth).name.cast::<u8>(), (*xauth).namelen as usize)
            }
            .to_vec();
            let data = unsafe {
                std::slice::from_raw_parts((*xauth).data.cast::<u8>(), (*xauth).datalen as usize)
            }
            .to_vec();
            (retval, Some(ItemValue::XAuthData(XAuthData { name, data })))
        } else {
            let text = unsafe { CStr::from_ptr(out.cast::<std::os::raw::c_char>()) }
                .to_bytes()
                .to_vec();
            (retval, Some(ItemValue::Plain(text)))
        }
    }

    fn set_item(&mut self, item_type: i32, value: &ItemValue) -> i32 {
        match value {
            ItemValue::Plain(bytes) => match CString::new(bytes.clone()) {
                Ok(cstr) => unsafe {
                    pam_ffi::pam_set_item(self.raw, item_type, cstr.as_ptr().cast())
                },
                Err(_) => pam_ffi::PAM_SUCCESS, // embedded NUL: nothing a C string can represent
            },
            ItemValue::XAuthData(xauth) => {
                let mut name = xauth.name.clone();
                let mut data = xauth.data.clone();
                let record = pam_xauth_data {
                    namelen: name.len() as i32,
                    name: name.as_mut_ptr().cast(),
                    datalen: data.len() as i32,
                    data: data.as_mut_ptr().cast(),
                };
                unsafe {
                    pam_ffi::pam_set_item(
                        self.raw,
                        item_type,
                        std::ptr::addr_of!(record).cast(),
                    )
                }
            }
        }
    }

    fn get_user(&mut self, prompt: Option<&[u8]>) -> (i32, Vec<u8>) {
        let prompt_cstring = prompt.and_then(|bytes| CString::new(bytes.to_vec()).ok());
        let prompt_ptr = prompt_cstring
            .as_ref()
            .map_or(std::ptr::null(), |cstr| cstr.as_ptr());
        let mut out: *const std::os::raw::c_char = std::ptr::null();
        let retval = unsafe { pam_ffi::pam_get_user(self.raw, &mut out, prompt_ptr) };
        if retval != pam_ffi::PAM_SUCCESS || out.is_null() {
            return (retval, Vec::new());
        }
        let user = unsafe { CStr::from_ptr(out) }.to_bytes().to_vec();
        (retval, user)
    }

    fn fail_delay(&mut self, usec: i32) -> i32 {
        unsafe { pam_ffi::pam_fail_delay(self.raw, usec as u32) }
    }

    fn strerror(&self, errnum: i32) -> Vec<u8> {
        let ptr = unsafe { pam_ffi::pam_strerror(self.raw.cast(), errnum) };
        if ptr.is_null() {
            return Vec::new();
        }
        unsafe { CStr::from_ptr(ptr) }.to_bytes().to_vec()
    }

    fn syslog(&self, priority: i32, msg: &[u8]) {
        let Ok(cmsg) = CString::new(msg.to_vec()) else {
            return;
        };
        let fmt = c"%s";
        unsafe {
            pam_ffi::pam_syslog(self.raw.cast(), priority, fmt.as_ptr(), cmsg.as_ptr());
        }
    }

    fn converse(&self, messages: &[ConvMessage]) -> (i32, Option<Vec<ConvResponse>>) {
        let mut conv_ptr: *const c_void = std::ptr::null();
        let retval =
            unsafe { pam_ffi::pam_get_item(self.raw, pam_ffi::PAM_CONV, &mut conv_ptr) };
        if retval != pam_ffi::PAM_SUCCESS || conv_ptr.is_null() {
            return (retval, None);
        }
        let conv = conv_ptr.cast::<pam_ffi::pam_conv>();
        let Some(callback) = (unsafe { (*conv).conv }) else {
            return (pam_ffi::PAM_SUCCESS, None);
        };

        let owned_texts: Vec<CString> = messages
            .iter()
            .map(|m| CString::new(m.text.clone()).unwrap_or_default())
            .collect();
        let c_messages: Vec<pam_message> = messages
            .iter()
            .zip(&owned_texts)
            .map(|(m, text)| pam_message {
                msg_style: m.style,
                msg: text.as_ptr(),
            })
            .collect();
        let message_ptrs: Vec<*const pam_message> =
            c_messages.iter().map(|m| m as *const pam_message).collect();

        let mut resp_ptr: *mut pam_response = std::ptr::null_mut();
        let appdata = unsafe { (*conv).appdata_ptr };
        let retval = unsafe {
            callback(
                message_ptrs.len() as i32,
                message_ptrs.as_ptr().cast_mut(),
                &mut resp_ptr,
                appdata,
            )
        };
        if retval != pam_ffi::PAM_SUCCESS || resp_ptr.is_null() {
            return (retval, None);
        }

        let mut responses = Vec::with_capacity(messages.len());
        for i in 0..messages.len() {
            let resp = unsafe { &*resp_ptr.add(i) };
            let text = if resp.resp.is_null() {
                None
            } else {
                let bytes = unsafe { CStr::from_ptr(resp.resp) }.to_bytes().to_vec();
                unsafe {
                    // Zero the PAM-allocated buffer before freeing it; this
                    // response text may be a password.
                    let len = bytes.len();
                    std::ptr::write_bytes(resp.resp, 0, len);
                    libc::free(resp.resp.cast());
                }
                Some(bytes)
            };
            responses.push(ConvResponse {
                retcode: resp.resp_retcode,
                text,
            });
        }
        unsafe {
            libc::free(resp_ptr.cast());
        }

        (pam_ffi::PAM_SUCCESS, Some(responses))
    }

    /// Builds a `pam_conv` value on the stack and hands its address to
    /// `pam_set_item`; per the item ownership rule in the data model,
    /// the host copies write data, so the struct need not outlive this
    /// call.
    fn install_default_conversation(&mut self) -> i32 {
        let local_conv = pam_ffi::pam_conv {
            conv: Some(default_conv_trampoline),
            appdata_ptr: std::ptr::null_mut(),
        };
        unsafe {
            pam_ffi::pam_set_item(
                self.raw,
                pam_ffi::PAM_CONV,
                std::ptr::addr_of!(local_conv).cast(),
            )
        }
    }
}

/// Returned by [`MockPamHandle::get_item`] for an item type nothing has set
/// yet — `core::PamCode::SystemErr`'s raw value, the generic "no such item"
/// code real `libpam` implementations use.
pub const MOCK_ITEM_NOT_SET: i32 = 4;

/// A scripted, in-memory `PamHandleOps` for unit tests. Holds a plain item
/// table, a canned conversation response list, and counters the dispatcher
/// tests assert against. `syslog` takes `&self` (matching the real FFI
/// call), so its call log needs interior mutability; every other method
/// already takes `&mut self`.
#[derive(Default)]
pub struct MockPamHandle {
    pub items: std::collections::HashMap<i32, ItemValue>,
    pub conversation_script: Vec<ConvResponse>,
    pub conversation_retval: i32,
    pub fail_delay_calls: Vec<i32>,
    pub syslog_calls: std::cell::RefCell<Vec<(i32, Vec<u8>)>>,
    pub set_item_retval: i32,
    pub get_user_result: (i32, Vec<u8>),
    pub default_conversation_installs: u32,
}

impl PamHandleOps for MockPamHandle {
    fn get_item(&self, item_type: i32) -> (i32, Option<ItemValue>) {
        match self.items.get(&item_type) {
            Some(value) => (pam_ffi::PAM_SUCCESS, Some(value.clone())),
            None => (MOCK_ITEM_NOT_SET, None),
        }
    }

    fn set_item(&mut self, item_type: i32, value: &ItemValue) -> i32 {
        self.items.insert(item_type, value.clone());
        self.set_item_retval
    }

    fn get_user(&mut self, _prompt: Option<&[u8]>) -> (i32, Vec<u8>) {
        self.get_user_result.clone()
    }

    fn fail_delay(&mut self, usec: i32) -> i32 {
        self.fail_delay_calls.push(usec);
        pam_ffi::PAM_SUCCESS
    }

    fn strerror(&self, errnum: i32) -> Vec<u8> {
        format!("mock error {errnum}").into_bytes()
    }

    fn syslog(&self, priority: i32, msg: &[u8]) {
        self.syslog_calls.borrow_mut().push((priority, msg.to_vec()));
    }

    fn converse(&self, _messages: &[ConvMessage]) -> (i32, Option<Vec<ConvResponse>>) {
        if self.conversation_retval == pam_ffi::PAM_SUCCESS {
            (pam_ffi::PAM_SUCCESS, Some(self.conversation_script.clone()))
        } else {
            (self.conversation_retval, None)
        }
    }

    fn install_default_conversation(&mut self) -> i32 {
        self.default_conversation_installs += 1;
        pam_ffi::PAM_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_round_trips_a_plain_item() {
        let mut mock = MockPamHandle {
            set_item_retval: pam_ffi::PAM_SUCCESS,
            ..Default::default()
        };
        let value = ItemValue::Plain(b"tomas".to_vec());
        assert_eq!(mock.set_item(pam_ffi::PAM_USER, &value), pam_ffi::PAM_SUCCESS);
        let (retval, got) = mock.get_item(pam_ffi::PAM_USER);
        assert_eq!(retval, pam_ffi::PAM_SUCCESS);
        assert_eq!(got, Some(value));
    }

    #[test]
    fn mock_reports_missing_item() {
        let mock = MockPamHandle::default();
        assert_eq!(mock.get_item(pam_ffi::PAM_USER), (MOCK_ITEM_NOT_SET, None));
    }

    #[test]
    fn mock_counts_default_conversation_installs() {
        let mut mock = MockPamHandle::default();
        assert_eq!(mock.install_default_conversation(), pam_ffi::PAM_SUCCESS);
        assert_eq!(mock.default_conversation_installs, 1);
    }
}

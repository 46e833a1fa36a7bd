//! The parent-side request loop: reads one tagged request at a time from
//! the child, resolves it against the real (or mock) PAM handle, and writes
//! back the matching reply — until the child closes its end cleanly.

use core::{Diagnostic, Hook, PamCode};
use wire::{
    ConverseReply, FailDelayReply, GetItemReply, GetUserReply, PipeEnd, Request, SetItemReply,
    StrErrorReply, WireStatus,
};
use zeroize::Zeroize;

use crate::handle::PamHandleOps;
use crate::pam_ffi::PAM_XAUTHDATA;

/// Runs the dispatch loop for one hook invocation until the child's request
/// pipe reaches a clean EOF or a wire failure occurs.
///
/// Returns [`PamCode::Success`] only when the child finished the exchange
/// cleanly; any wire failure collapses to `hook`'s table default rather
/// than propagating a wire-level detail to the hook's caller.
pub fn run(
    hook: Hook,
    handle: &mut dyn PamHandleOps,
    from_child: &mut PipeEnd,
    to_child: &mut PipeEnd,
    err_return_override: Option<PamCode>,
) -> PamCode {
    loop {
        let request = match Request::read_next(from_child, |item_type| item_type == PAM_XAUTHDATA)
        {
            Ok(Some(request)) => request,
            Ok(None) => return PamCode::Success,
            Err(status) => {
                let diagnostic = Diagnostic::Wire { hook, status };
                tracing::warn!(%diagnostic, "dispatcher read failed");
                return diagnostic.into_pam_code(err_return_override);
            }
        };

        let write_status = match request {
            Request::GetItem { item_type } => {
                let (retval, value) = handle.get_item(item_type);
                GetItemReply { retval, value }.write(
                    to_child,
                    PamCode::Success as i32,
                    item_type == PAM_XAUTHDATA,
                )
            }
            Request::SetItem { item_type, value } => {
                let retval = handle.set_item(item_type, &value);
                SetItemReply { retval }.write(to_child)
            }
            Request::GetUser { prompt } => {
                let (retval, user) = handle.get_user(prompt.as_deref());
                GetUserReply { retval, user }.write(to_child)
            }
            Request::Converse { messages } => {
                let (retval, responses) = handle.converse(&messages);
                let mut reply = ConverseReply { retval, responses };
                let status = reply.write(to_child, PamCode::Success as i32);
                if let Some(responses) = &mut reply.responses {
                    for response in responses {
                        if let Some(text) = &mut response.text {
                            text.zeroize();
                        }
                    }
                }
                status
            }
            Request::FailDelay { usec } => {
                let retval = handle.fail_delay(usec);
                FailDelayReply { retval }.write(to_child)
            }
            Request::StrError { errnum } => {
                let text = handle.strerror(errnum);
                StrErrorReply { text }.write(to_child)
            }
            Request::SysLog { priority, message } => {
                handle.syslog(priority, &message);
                WireStatus::Success
            }
            Request::Unknown(tag) => {
                tracing::warn!(tag, %hook, "unknown request tag from child");
                handle.syslog(
                    libc::LOG_ERR,
                    format!("pam-script-bridge: unknown request tag {tag}").as_bytes(),
                );
                return err_return_override.unwrap_or_else(|| hook.default_code());
            }
        };

        if !write_status.is_success() {
            let diagnostic = Diagnostic::Wire {
                hook,
                status: write_status,
            };
            tracing::warn!(%diagnostic, "dispatcher write failed");
            return diagnostic.into_pam_code(err_return_override);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::MockPamHandle;
    use wire::{anonymous_pipe, ConvResponse, ItemValue};

    fn child_pipes() -> (PipeEnd, PipeEnd, PipeEnd, PipeEnd) {
        let (child_read, parent_write) = anonymous_pipe().unwrap();
        let (parent_read, child_write) = anonymous_pipe().unwrap();
        (parent_read, parent_write, child_read, child_write)
    }

    #[test]
    fn serves_get_item_then_stops_on_clean_eof() {
        let (mut from_child, mut to_child, mut child_read, mut child_write) = child_pipes();
        let mut mock = MockPamHandle::default();
        mock.items.insert(2, ItemValue::Plain(b"tomas".to_vec()));

        let request = Request::GetItem { item_type: 2 };
        assert_eq!(request.write(&mut child_write), WireStatus::Success);
        drop(child_write);

        let code = run(Hook::Authenticate, &mut mock, &mut from_child, &mut to_child, None);
        assert_eq!(code, PamCode::Success);

        let reply = GetItemReply::read(&mut child_read, 0, false).unwrap();
        assert_eq!(reply.retval, 0);
        assert_eq!(reply.value, Some(ItemValue::Plain(b"tomas".to_vec())));
    }

    #[test]
    fn unknown_tag_returns_the_hook_default() {
        let (mut from_child, mut to_child, _child_read, mut child_write) = child_pipes();
        let mut mock = MockPamHandle::default();
        let _ = child_write.write_int(123);
        drop(child_write);

        let code = run(Hook::OpenSession, &mut mock, &mut from_child, &mut to_child, None);
        assert_eq!(code, PamCode::SessionErr);
    }

    #[test]
    fn converse_relays_scripted_responses() {
        let (mut from_child, mut to_child, mut child_read, mut child_write) = child_pipes();
        let mut mock = MockPamHandle {
            conversation_retval: 0,
            conversation_script: vec![ConvResponse {
                retcode: 0,
                text: Some(b"hunter2".to_vec()),
            }],
            ..Default::default()
        };

        let request = Request::Converse {
            messages: vec![wire::ConvMessage {
                style: 1,
                text: b"Password: ".to_vec(),
            }],
        };
        assert_eq!(request.write(&mut child_write), WireStatus::Success);
        drop(child_write);

        let code = run(Hook::Authenticate, &mut mock, &mut from_child, &mut to_child, None);
        assert_eq!(code, PamCode::Success);

        let reply = ConverseReply::read(&mut child_read, 0, 1).unwrap();
        assert_eq!(reply.retval, 0);
        assert_eq!(
            reply.responses,
            Some(vec![ConvResponse {
                retcode: 0,
                text: Some(b"hunter2".to_vec())
            }])
        );
    }
}

//! End-to-end coverage of the six scenarios in the specification's
//! "testable properties" section, driven against the real wire protocol and
//! dispatcher, without a real `libpam` or CPython interpreter: a plain
//! thread stands in for the forked child, issuing the same `Request`
//! traffic the `policy` crate's RPC stubs would.

use std::thread;

use core::{Hook, PamCode};
use host::{run_dispatcher, MockPamHandle};
use wire::{
    anonymous_pipe, ConvMessage, ConvResponse, GetItemReply, ItemValue, Request, XAuthData,
};

/// Builds the two pipe pairs the orchestrator wires up per hook invocation:
/// `(parent's from-child read, parent's to-child write, child's read, child's write)`.
fn pipe_quad() -> (wire::PipeEnd, wire::PipeEnd, wire::PipeEnd, wire::PipeEnd) {
    let (child_read, parent_write) = anonymous_pipe().expect("child-to-parent pipe");
    let (parent_read, child_write) = anonymous_pipe().expect("parent-to-child pipe");
    (parent_read, parent_write, child_read, child_write)
}

#[test]
fn scenario_pass_through_user_lookup() {
    let (mut from_child, mut to_child, mut child_read, mut child_write) = pipe_quad();
    let mut mock = MockPamHandle {
        set_item_retval: 0,
        ..Default::default()
    };
    mock.items.insert(2, ItemValue::Plain(b"alice".to_vec()));

    let child = thread::spawn(move || {
        Request::GetItem { item_type: 2 }.write(&mut child_write);
        let reply = GetItemReply::read(&mut child_read, 0, false).expect("get_item reply");
        drop(child_write);
        reply
    });

    let code = run_dispatcher(Hook::Authenticate, &mut mock, &mut from_child, &mut to_child, None);
    assert_eq!(code, PamCode::Success);

    let observed = child.join().expect("child thread");
    assert_eq!(observed.retval, 0);
    assert_eq!(observed.value, Some(ItemValue::Plain(b"alice".to_vec())));
}

#[test]
fn scenario_xauthdata_round_trip() {
    const XAUTHDATA: i32 = core::item::XAUTHDATA;

    let (mut from_child, mut to_child, mut child_read, mut child_write) = pipe_quad();
    let mut mock = MockPamHandle::default();
    mock.items.insert(
        XAUTHDATA,
        ItemValue::XAuthData(XAuthData {
            name: b"ken".to_vec(),
            data: b"some_data".to_vec(),
        }),
    );

    let child = thread::spawn(move || {
        Request::GetItem {
            item_type: XAUTHDATA,
        }
        .write(&mut child_write);
        let reply = GetItemReply::read(&mut child_read, 0, true).expect("get_item reply");
        drop(child_write);
        reply
    });

    let code = run_dispatcher(Hook::Authenticate, &mut mock, &mut from_child, &mut to_child, None);
    assert_eq!(code, PamCode::Success);

    let observed = child.join().expect("child thread");
    assert_eq!(
        observed.value,
        Some(ItemValue::XAuthData(XAuthData {
            name: b"ken".to_vec(),
            data: b"some_data".to_vec(),
        }))
    );
}

#[test]
fn scenario_conversation_password_flow() {
    let (mut from_child, mut to_child, mut child_read, mut child_write) = pipe_quad();
    let mut mock = MockPamHandle {
        conversation_retval: 0,
        conversation_script: vec![ConvResponse {
            retcode: 0,
            text: Some(b"hunter2".to_vec()),
        }],
        ..Default::default()
    };

    let child = thread::spawn(move || {
        Request::Converse {
            messages: vec![ConvMessage {
                style: 1,
                text: b"Password: ".to_vec(),
            }],
        }
        .write(&mut child_write);
        let reply = wire::ConverseReply::read(&mut child_read, 0, 1).expect("converse reply");
        drop(child_write);
        reply
    });

    let code = run_dispatcher(Hook::Authenticate, &mut mock, &mut from_child, &mut to_child, None);
    assert_eq!(code, PamCode::Success);

    let observed = child.join().expect("child thread");
    assert_eq!(
        observed.responses,
        Some(vec![ConvResponse {
            retcode: 0,
            text: Some(b"hunter2".to_vec())
        }])
    );
}

#[test]
fn scenario_unknown_tag_logs_and_returns_hook_default() {
    let (mut from_child, mut to_child, _child_read, mut child_write) = pipe_quad();
    let mut mock = MockPamHandle::default();

    let child = thread::spawn(move || {
        child_write.write_int(99);
        drop(child_write);
    });

    let code = run_dispatcher(Hook::SetCred, &mut mock, &mut from_child, &mut to_child, None);
    assert_eq!(code, PamCode::CredErr);
    child.join().expect("child thread");

    let logged = mock.syslog_calls.borrow();
    assert_eq!(logged.len(), 1);
    assert!(String::from_utf8_lossy(&logged[0].1).contains("99"));
}

#[test]
fn scenario_clean_termination_without_any_rpc() {
    let (mut from_child, mut to_child, _child_read, child_write) = pipe_quad();
    let mut mock = MockPamHandle::default();

    // The policy issued no RPCs at all and the child simply exited,
    // closing its write end — the parent's very first read sees EOF.
    drop(child_write);

    let code = run_dispatcher(Hook::Authenticate, &mut mock, &mut from_child, &mut to_child, None);
    assert_eq!(code, PamCode::Success);
}

#[test]
fn unknown_hook_label_has_no_default_table_entry() {
    assert_eq!(Hook::from_label("pam_sm_frobnicate"), None);
    assert_eq!(core::UNKNOWN_HOOK_DEFAULT, PamCode::Abort);
}

#[test]
fn err_return_override_wins_over_an_unknown_tag() {
    let (mut from_child, mut to_child, _child_read, mut child_write) = pipe_quad();
    let mut mock = MockPamHandle::default();

    let child = thread::spawn(move || {
        child_write.write_int(123);
        drop(child_write);
    });

    let code = run_dispatcher(
        Hook::OpenSession,
        &mut mock,
        &mut from_child,
        &mut to_child,
        Some(PamCode::Success),
    );
    assert_eq!(code, PamCode::Success);
    child.join().expect("child thread");
}

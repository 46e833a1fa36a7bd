//! The built-in Python module registered via `append_to_inittab!` — the
//! `#[pyfunction]`s a policy script calls to reach back across the pipe
//! into the parent's real `pam_handle_t`.
//!
//! Every stub here blocks until its matching reply arrives; the protocol
//! guarantees single-outstanding-request ordering, so there is never a
//! second call in flight to race against.

use pyo3::exceptions::PyOSError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyList, PyTuple};

use wire::{
    ConverseReply, FailDelayReply, GetItemReply, GetUserReply, ItemValue, Request, SetItemReply,
    StrErrorReply, WireStatus, XAuthData as WireXAuthData,
};

use crate::channel::with_channel;

fn wire_err(status: WireStatus) -> PyErr {
    PyOSError::new_err(format!("pam-script-bridge pipe failure: {status}"))
}

/// X auth data surfaced to Python as a small object with `name`/`data`
/// `bytes` attributes, never a bare tuple — the resolved shape for this
/// item type everywhere in this workspace.
#[pyclass(name = "XAuthData")]
#[derive(Clone)]
pub struct PyXAuthData {
    #[pyo3(get, set)]
    pub name: Py<PyBytes>,
    #[pyo3(get, set)]
    pub data: Py<PyBytes>,
}

#[pymethods]
impl PyXAuthData {
    #[new]
    fn new(py: Python<'_>, name: Vec<u8>, data: Vec<u8>) -> Self {
        Self {
            name: PyBytes::new_bound(py, &name).unbind(),
            data: PyBytes::new_bound(py, &data).unbind(),
        }
    }

    fn __repr__(&self, py: Python<'_>) -> String {
        format!(
            "XAuthData(name={!r}, data=<{} bytes>)",
            self.name.bind(py).as_bytes(),
            self.data.bind(py).as_bytes().len()
        )
    }
}

#[pyfunction]
fn get_item(py: Python<'_>, item_type: i32) -> PyResult<(i32, PyObject)> {
    let is_xauth = core::item::is_xauthdata(item_type);
    let reply: Result<GetItemReply, WireStatus> = with_channel(|channel| {
        let request = Request::GetItem { item_type };
        let status = request.write(&mut channel.to_parent);
        if !status.is_success() {
            return Err(status);
        }
        GetItemReply::read(&mut channel.from_parent, 0, is_xauth)
    });
    let reply = reply.map_err(wire_err)?;

    let value_obj: PyObject = match reply.value {
        None => py.None(),
        Some(ItemValue::Plain(bytes)) => PyBytes::new_bound(py, &bytes).into_py(py),
        Some(ItemValue::XAuthData(WireXAuthData { name, data })) => {
            Py::new(py, PyXAuthData::new(py, name, data))?.into_py(py)
        }
    };
    Ok((reply.retval, value_obj))
}

#[pyfunction]
fn set_item(item_type: i32, value: PyObject, py: Python<'_>) -> PyResult<i32> {
    let is_xauth = core::item::is_xauthdata(item_type);
    let wire_value = if is_xauth {
        let xauth: PyXAuthData = value.extract(py)?;
        ItemValue::XAuthData(WireXAuthData {
            name: xauth.name.bind(py).as_bytes().to_vec(),
            data: xauth.data.bind(py).as_bytes().to_vec(),
        })
    } else {
        let bytes: Vec<u8> = value.extract(py)?;
        ItemValue::Plain(bytes)
    };

    let reply: Result<SetItemReply, WireStatus> = with_channel(|channel| {
        let request = Request::SetItem {
            item_type,
            value: wire_value,
        };
        let status = request.write(&mut channel.to_parent);
        if !status.is_success() {
            return Err(status);
        }
        SetItemReply::read(&mut channel.from_parent)
    });
    Ok(reply.map_err(wire_err)?.retval)
}

#[pyfunction]
#[pyo3(signature = (prompt=None))]
fn get_user(py: Python<'_>, prompt: Option<Vec<u8>>) -> PyResult<(i32, PyObject)> {
    let reply: Result<GetUserReply, WireStatus> = with_channel(|channel| {
        let request = Request::GetUser {
            prompt: prompt.clone(),
        };
        let status = request.write(&mut channel.to_parent);
        if !status.is_success() {
            return Err(status);
        }
        GetUserReply::read(&mut channel.from_parent)
    });
    let reply = reply.map_err(wire_err)?;
    Ok((reply.retval, PyBytes::new_bound(py, &reply.user).into_py(py)))
}

#[pyfunction]
fn converse(py: Python<'_>, messages: Vec<(i32, Vec<u8>)>) -> PyResult<(i32, PyObject)> {
    let wire_messages: Vec<wire::ConvMessage> = messages
        .into_iter()
        .map(|(style, text)| wire::ConvMessage { style, text })
        .collect();
    let num_msgs = wire_messages.len();

    let reply: Result<ConverseReply, WireStatus> = with_channel(|channel| {
        let request = Request::Converse {
            messages: wire_messages,
        };
        let status = request.write(&mut channel.to_parent);
        if !status.is_success() {
            return Err(status);
        }
        ConverseReply::read(&mut channel.from_parent, 0, num_msgs)
    });
    let reply = reply.map_err(wire_err)?;

    let responses = match reply.responses {
        None => py.None(),
        Some(responses) => {
            let items: Vec<Py<PyTuple>> = responses
                .into_iter()
                .map(|response| {
                    let text_obj: PyObject = match response.text {
                        Some(bytes) => PyBytes::new_bound(py, &bytes).into_py(py),
                        None => py.None(),
                    };
                    PyTuple::new_bound(py, [response.retcode.into_py(py), text_obj]).unbind()
                })
                .collect();
            PyList::new_bound(py, items).into_py(py)
        }
    };
    Ok((reply.retval, responses))
}

#[pyfunction]
fn fail_delay(usec: i32) -> PyResult<i32> {
    let reply: Result<FailDelayReply, WireStatus> = with_channel(|channel| {
        let request = Request::FailDelay { usec };
        let status = request.write(&mut channel.to_parent);
        if !status.is_success() {
            return Err(status);
        }
        FailDelayReply::read(&mut channel.from_parent)
    });
    Ok(reply.map_err(wire_err)?.retval)
}

#[pyfunction]
fn strerror(py: Python<'_>, errnum: i32) -> PyResult<PyObject> {
    let reply: Result<StrErrorReply, WireStatus> = with_channel(|channel| {
        let request = Request::StrError { errnum };
        let status = request.write(&mut channel.to_parent);
        if !status.is_success() {
            return Err(status);
        }
        StrErrorReply::read(&mut channel.from_parent)
    });
    let reply = reply.map_err(wire_err)?;
    Ok(PyBytes::new_bound(py, &reply.text).into_py(py))
}

#[pyfunction]
fn syslog(priority: i32, message: Vec<u8>) -> PyResult<()> {
    let status = with_channel(|channel| {
        let request = Request::SysLog {
            priority,
            message,
        };
        request.write(&mut channel.to_parent)
    });
    if status.is_success() {
        Ok(())
    } else {
        Err(wire_err(status))
    }
}

/// Registered into CPython's inittab before `Py_Initialize` runs.
#[pymodule]
#[pyo3(name = "pam")]
pub fn pam_bridge_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyXAuthData>()?;
    m.add_function(wrap_pyfunction!(get_item, m)?)?;
    m.add_function(wrap_pyfunction!(set_item, m)?)?;
    m.add_function(wrap_pyfunction!(get_user, m)?)?;
    m.add_function(wrap_pyfunction!(converse, m)?)?;
    m.add_function(wrap_pyfunction!(fail_delay, m)?)?;
    m.add_function(wrap_pyfunction!(strerror, m)?)?;
    m.add_function(wrap_pyfunction!(syslog, m)?)?;
    for (name, value) in [
        ("PAM_SUCCESS", 0),
        ("PAM_PROMPT_ECHO_OFF", 1),
        ("PAM_PROMPT_ECHO_ON", 2),
        ("PAM_ERROR_MSG", 3),
        ("PAM_TEXT_INFO", 4),
    ] {
        m.add(name, value)?;
    }
    Ok(())
}

//! The tagged request/reply schemas exchanged between the child (running the
//! policy interpreter) and the parent (holding the real authentication
//! handle), one pipe each direction.
//!
//! Requests are strictly serialized: the child issues one tagged request,
//! reads the complete reply, and only then issues the next one. A sum type
//! with one variant per tag replaces the polymorphic dispatch the original
//! implementation reached for — decoding a [`Request`] off the wire already
//! selects the parent-side handler, so the dispatcher reduces to a single
//! `match`.

use crate::pipe::PipeEnd;
use crate::status::WireStatus;

/// The closed set of legal request tags. No other integer value is valid on
/// the wire; the parent treats anything else as [`Request::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Tag {
    GetItem = 1,
    SetItem = 2,
    GetUser = 3,
    Converse = 4,
    FailDelay = 5,
    StrError = 6,
    SysLog = 7,
}

impl Tag {
    fn from_i32(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::GetItem),
            2 => Some(Self::SetItem),
            3 => Some(Self::GetUser),
            4 => Some(Self::Converse),
            5 => Some(Self::FailDelay),
            6 => Some(Self::StrError),
            7 => Some(Self::SysLog),
            _ => None,
        }
    }
}

/// An X auth data item: a name and an opaque data blob, each with an
/// explicit length (the data may contain embedded null bytes). Per the
/// resolved field-naming ambiguity, these are always `name`/`data` on the
/// freshly decoded record — never an aliased `xauth->name`/`xauth->data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XAuthData {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
}

/// The value carried by GET_ITEM/SET_ITEM, shaped by whether the item type
/// is X auth data or an ordinary string item. The wire protocol itself does
/// not know which raw item-type integer means "X auth data" — callers pass
/// that down as `is_xauthdata` so this crate stays free of any particular
/// host framework's item-type table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValue {
    Plain(Vec<u8>),
    XAuthData(XAuthData),
}

impl ItemValue {
    /// The "null or empty item" shape §4.3 requires on the wire: a zero
    /// length and no payload, shaped like whichever item type was requested
    /// so the reader's unconditional `ItemValue::read` never blocks on a
    /// length that was never sent.
    fn empty(is_xauthdata: bool) -> Self {
        if is_xauthdata {
            Self::XAuthData(XAuthData {
                name: Vec::new(),
                data: Vec::new(),
            })
        } else {
            Self::Plain(Vec::new())
        }
    }

    fn write(&self, pipe: &mut PipeEnd) -> WireStatus {
        match self {
            Self::Plain(bytes) => {
                let status = pipe.write_int(bytes.len() as i32);
                if !status.is_success() {
                    return status;
                }
                pipe.write_string(bytes)
            }
            Self::XAuthData(xauth) => {
                let status = pipe.write_int(xauth.name.len() as i32);
                if !status.is_success() {
                    return status;
                }
                let status = pipe.write_string(&xauth.name);
                if !status.is_success() {
                    return status;
                }
                let status = pipe.write_int(xauth.data.len() as i32);
                if !status.is_success() {
                    return status;
                }
                pipe.write_string(&xauth.data)
            }
        }
    }

    fn read(pipe: &mut PipeEnd, is_xauthdata: bool) -> Result<Self, WireStatus> {
        if is_xauthdata {
            let name_len = pipe.read_int()?;
            let name = pipe.read_string(usize_from(name_len)?)?;
            let data_len = pipe.read_int()?;
            let data = pipe.read_string(usize_from(data_len)?)?;
            Ok(Self::XAuthData(XAuthData { name, data }))
        } else {
            let len = pipe.read_int()?;
            let bytes = pipe.read_string(usize_from(len)?)?;
            Ok(Self::Plain(bytes))
        }
    }
}

fn usize_from(len: i32) -> Result<usize, WireStatus> {
    usize::try_from(len).map_err(|_| WireStatus::MallocErr)
}

/// One conversation prompt: a PAM message style and its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvMessage {
    pub style: i32,
    pub text: Vec<u8>,
}

/// One conversation response: the per-message return code and, when
/// present, the response text. Response text is sensitive — callers that
/// hold one past the point of sending the reply must zero it before
/// release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvResponse {
    pub retcode: i32,
    pub text: Option<Vec<u8>>,
}

/// A fully decoded request, ready for the parent dispatcher to match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetItem {
        item_type: i32,
    },
    SetItem {
        item_type: i32,
        value: ItemValue,
    },
    GetUser {
        prompt: Option<Vec<u8>>,
    },
    Converse {
        messages: Vec<ConvMessage>,
    },
    FailDelay {
        usec: i32,
    },
    StrError {
        errnum: i32,
    },
    SysLog {
        priority: i32,
        message: Vec<u8>,
    },
    /// A tag outside the closed set. The dispatcher logs the offending
    /// integer and returns the hook's default error; it does not attempt to
    /// keep reading a body that has no schema.
    Unknown(i32),
}

impl Request {
    /// Reads one full request off `pipe`. `is_xauthdata` decides how a
    /// SET_ITEM body is shaped; it is irrelevant to every other tag.
    ///
    /// Returns `Ok(None)` only for a clean EOF at the very start of a
    /// request — the signal that the child exited normally and the parent
    /// loop should stop.
    pub fn read_next(
        pipe: &mut PipeEnd,
        is_xauthdata: impl Fn(i32) -> bool,
    ) -> Result<Option<Self>, WireStatus> {
        let raw_tag = match pipe.read_int() {
            Ok(tag) => tag,
            Err(WireStatus::ReadEof) => return Ok(None),
            Err(status) => return Err(status),
        };

        let Some(tag) = Tag::from_i32(raw_tag) else {
            return Ok(Some(Self::Unknown(raw_tag)));
        };

        let request = match tag {
            Tag::GetItem => {
                let item_type = pipe.read_int()?;
                Self::GetItem { item_type }
            }
            Tag::SetItem => {
                let item_type = pipe.read_int()?;
                let value = ItemValue::read(pipe, is_xauthdata(item_type))?;
                Self::SetItem { item_type, value }
            }
            Tag::GetUser => {
                let prompt_len = pipe.read_int()?;
                let prompt = if prompt_len > 0 {
                    Some(pipe.read_string(usize_from(prompt_len)?)?)
                } else {
                    None
                };
                Self::GetUser { prompt }
            }
            Tag::Converse => {
                let num_msgs = pipe.read_int()?;
                let mut messages = Vec::with_capacity(usize_from(num_msgs)?);
                for _ in 0..num_msgs {
                    let style = pipe.read_int()?;
                    let text_len = pipe.read_int()?;
                    let text = pipe.read_string(usize_from(text_len)?)?;
                    messages.push(ConvMessage { style, text });
                }
                Self::Converse { messages }
            }
            Tag::FailDelay => {
                let usec = pipe.read_int()?;
                Self::FailDelay { usec }
            }
            Tag::StrError => {
                let errnum = pipe.read_int()?;
                Self::StrError { errnum }
            }
            Tag::SysLog => {
                let priority = pipe.read_int()?;
                let len = pipe.read_int()?;
                let message = pipe.read_string(usize_from(len)?)?;
                Self::SysLog { priority, message }
            }
        };
        Ok(Some(request))
    }

    /// Encodes the tag and request body for the child side to send.
    pub fn write(&self, pipe: &mut PipeEnd) -> WireStatus {
        macro_rules! try_status {
            ($expr:expr) => {{
                let status = $expr;
                if !status.is_success() {
                    return status;
                }
            }};
        }

        match self {
            Self::GetItem { item_type } => {
                try_status!(pipe.write_int(Tag::GetItem as i32));
                pipe.write_int(*item_type)
            }
            Self::SetItem { item_type, value } => {
                try_status!(pipe.write_int(Tag::SetItem as i32));
                try_status!(pipe.write_int(*item_type));
                value.write(pipe)
            }
            Self::GetUser { prompt } => {
                try_status!(pipe.write_int(Tag::GetUser as i32));
                match prompt {
                    Some(bytes) => {
                        try_status!(pipe.write_int(bytes.len() as i32));
                        pipe.write_string(bytes)
                    }
                    None => pipe.write_int(0),
                }
            }
            Self::Converse { messages } => {
                try_status!(pipe.write_int(Tag::Converse as i32));
                try_status!(pipe.write_int(messages.len() as i32));
                for message in messages {
                    try_status!(pipe.write_int(message.style));
                    try_status!(pipe.write_int(message.text.len() as i32));
                    try_status!(pipe.write_string(&message.text));
                }
                WireStatus::Success
            }
            Self::FailDelay { usec } => {
                try_status!(pipe.write_int(Tag::FailDelay as i32));
                pipe.write_int(*usec)
            }
            Self::StrError { errnum } => {
                try_status!(pipe.write_int(Tag::StrError as i32));
                pipe.write_int(*errnum)
            }
            Self::SysLog { priority, message } => {
                try_status!(pipe.write_int(Tag::SysLog as i32));
                try_status!(pipe.write_int(*priority));
                try_status!(pipe.write_int(message.len() as i32));
                pipe.write_string(message)
            }
            Self::Unknown(tag) => pipe.write_int(*tag),
        }
    }
}

/// Reply to GET_ITEM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetItemReply {
    pub retval: i32,
    pub value: Option<ItemValue>,
}

impl GetItemReply {
    /// Writes the reply. Per §4.3, a SUCCESS retval always carries a value
    /// on the wire — a null or empty item still writes a zero length and no
    /// payload — so the reader's unconditional read on success never blocks.
    pub fn write(&self, pipe: &mut PipeEnd, retval_success: i32, is_xauthdata: bool) -> WireStatus {
        let status = pipe.write_int(self.retval);
        if !status.is_success() {
            return status;
        }
        if self.retval != retval_success {
            return WireStatus::Success;
        }
        match &self.value {
            Some(value) => value.write(pipe),
            None => ItemValue::empty(is_xauthdata).write(pipe),
        }
    }

    pub fn read(pipe: &mut PipeEnd, retval_success: i32, is_xauthdata: bool) -> Result<Self, WireStatus> {
        let retval = pipe.read_int()?;
        let value = if retval == retval_success {
            Some(ItemValue::read(pipe, is_xauthdata)?)
        } else {
            None
        };
        Ok(Self { retval, value })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetItemReply {
    pub retval: i32,
}

impl SetItemReply {
    pub fn write(&self, pipe: &mut PipeEnd) -> WireStatus {
        pipe.write_int(self.retval)
    }

    pub fn read(pipe: &mut PipeEnd) -> Result<Self, WireStatus> {
        Ok(Self {
            retval: pipe.read_int()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetUserReply {
    pub retval: i32,
    pub user: Vec<u8>,
}

impl GetUserReply {
    pub fn write(&self, pipe: &mut PipeEnd) -> WireStatus {
        let status = pipe.write_int(self.retval);
        if !status.is_success() {
            return status;
        }
        let status = pipe.write_int(self.user.len() as i32);
        if !status.is_success() {
            return status;
        }
        pipe.write_string(&self.user)
    }

    pub fn read(pipe: &mut PipeEnd) -> Result<Self, WireStatus> {
        let retval = pipe.read_int()?;
        let len = pipe.read_int()?;
        let user = pipe.read_string(usize_from(len)?)?;
        Ok(Self { retval, user })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverseReply {
    pub retval: i32,
    pub responses: Option<Vec<ConvResponse>>,
}

impl ConverseReply {
    pub fn write(&self, pipe: &mut PipeEnd, retval_success: i32) -> WireStatus {
        let status = pipe.write_int(self.retval);
        if !status.is_success() {
            return status;
        }
        if self.retval != retval_success {
            return WireStatus::Success;
        }
        let Some(responses) = &self.responses else {
            return WireStatus::Success;
        };
        for response in responses {
            let status = pipe.write_int(response.retcode);
            if !status.is_success() {
                return status;
            }
            match &response.text {
                Some(text) => {
                    let status = pipe.write_int(text.len() as i32);
                    if !status.is_success() {
                        return status;
                    }
                    let status = pipe.write_string(text);
                    if !status.is_success() {
                        return status;
                    }
                }
                None => {
                    let status = pipe.write_int(0);
                    if !status.is_success() {
                        return status;
                    }
                }
            }
        }
        WireStatus::Success
    }

    pub fn read(
        pipe: &mut PipeEnd,
        retval_success: i32,
        num_msgs: usize,
    ) -> Result<Self, WireStatus> {
        let retval = pipe.read_int()?;
        if retval != retval_success {
            return Ok(Self {
                retval,
                responses: None,
            });
        }
        let mut responses = Vec::with_capacity(num_msgs);
        for _ in 0..num_msgs {
            let retcode = pipe.read_int()?;
            let len = pipe.read_int()?;
            let text = if len > 0 {
                Some(pipe.read_string(usize_from(len)?)?)
            } else {
                None
            };
            responses.push(ConvResponse { retcode, text });
        }
        Ok(Self {
            retval,
            responses: Some(responses),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailDelayReply {
    pub retval: i32,
}

impl FailDelayReply {
    pub fn write(&self, pipe: &mut PipeEnd) -> WireStatus {
        pipe.write_int(self.retval)
    }

    pub fn read(pipe: &mut PipeEnd) -> Result<Self, WireStatus> {
        Ok(Self {
            retval: pipe.read_int()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrErrorReply {
    pub text: Vec<u8>,
}

impl StrErrorReply {
    pub fn write(&self, pipe: &mut PipeEnd) -> WireStatus {
        let status = pipe.write_int(self.text.len() as i32);
        if !status.is_success() {
            return status;
        }
        pipe.write_string(&self.text)
    }

    pub fn read(pipe: &mut PipeEnd) -> Result<Self, WireStatus> {
        let len = pipe.read_int()?;
        let text = pipe.read_string(usize_from(len)?)?;
        Ok(Self { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::anonymous_pipe;

    fn no_xauth(_: i32) -> bool {
        false
    }

    #[test]
    fn get_item_plain_round_trips() {
        let (mut r, mut w) = anonymous_pipe().unwrap();
        let req = Request::GetItem { item_type: 2 };
        assert_eq!(req.write(&mut w), WireStatus::Success);
        let decoded = Request::read_next(&mut r, no_xauth).unwrap().unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn set_item_xauthdata_round_trips() {
        let (mut r, mut w) = anonymous_pipe().unwrap();
        let req = Request::SetItem {
            item_type: 99,
            value: ItemValue::XAuthData(XAuthData {
                name: b"ken".to_vec(),
                data: b"some_data".to_vec(),
            }),
        };
        assert_eq!(req.write(&mut w), WireStatus::Success);
        let decoded = Request::read_next(&mut r, |t| t == 99).unwrap().unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn converse_round_trips_multiple_messages() {
        let (mut r, mut w) = anonymous_pipe().unwrap();
        let req = Request::Converse {
            messages: vec![
                ConvMessage {
                    style: 1,
                    text: b"Password: ".to_vec(),
                },
                ConvMessage {
                    style: 3,
                    text: b"done".to_vec(),
                },
            ],
        };
        assert_eq!(req.write(&mut w), WireStatus::Success);
        let decoded = Request::read_next(&mut r, no_xauth).unwrap().unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn get_user_with_no_prompt_round_trips() {
        let (mut r, mut w) = anonymous_pipe().unwrap();
        let req = Request::GetUser { prompt: None };
        assert_eq!(req.write(&mut w), WireStatus::Success);
        let decoded = Request::read_next(&mut r, no_xauth).unwrap().unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn unknown_tag_is_reported_without_consuming_a_body() {
        let (mut r, mut w) = anonymous_pipe().unwrap();
        assert_eq!(w.write_int(99), WireStatus::Success);
        drop(w);
        let decoded = Request::read_next(&mut r, no_xauth).unwrap().unwrap();
        assert_eq!(decoded, Request::Unknown(99));
    }

    #[test]
    fn clean_eof_before_any_request_yields_none() {
        let (mut r, w) = anonymous_pipe().unwrap();
        drop(w);
        assert_eq!(Request::read_next(&mut r, no_xauth).unwrap(), None);
    }

    #[test]
    fn converse_reply_round_trips_responses() {
        let (mut r, mut w) = anonymous_pipe().unwrap();
        let reply = ConverseReply {
            retval: 0,
            responses: Some(vec![
                ConvResponse {
                    retcode: 0,
                    text: Some(b"hunter2".to_vec()),
                },
                ConvResponse {
                    retcode: 0,
                    text: None,
                },
            ]),
        };
        assert_eq!(reply.write(&mut w, 0), WireStatus::Success);
        let decoded = ConverseReply::read(&mut r, 0, 2).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn converse_reply_with_failure_carries_no_responses() {
        let (mut r, mut w) = anonymous_pipe().unwrap();
        let reply = ConverseReply {
            retval: 24,
            responses: None,
        };
        assert_eq!(reply.write(&mut w, 0), WireStatus::Success);
        let decoded = ConverseReply::read(&mut r, 0, 5).unwrap();
        assert_eq!(decoded, reply);
    }
}

//! Framed pipe I/O and the parent/child RPC wire protocol shared by the
//! `host` and `policy` crates.
//!
//! This crate knows nothing about PAM, Python, or any particular item-type
//! table — it only knows how to put bytes on a pipe and take them back off
//! in the seven shapes the protocol defines. Callers that need to know
//! whether a given item type means "X auth data" supply that as a predicate
//! or a flag rather than this crate hard-coding a constant it cannot verify.

pub mod pipe;
pub mod protocol;
pub mod status;

pub use pipe::{anonymous_pipe, PipeEnd};
pub use protocol::{
    ConvMessage, ConvResponse, ConverseReply, FailDelayReply, GetItemReply, GetUserReply,
    ItemValue, Request, SetItemReply, StrErrorReply, Tag, XAuthData,
};
pub use status::WireStatus;

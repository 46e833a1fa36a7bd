//! The default, terminal-based conversation callback used when no host
//! application conversation function is available to relay through —
//! standalone testing of a policy script, or a `pam_get_item(PAM_CONV)`
//! lookup that itself failed.
//!
//! Grounded directly in the reference `converse()`: four message styles,
//! `PAM_PROMPT_ECHO_OFF` reads with terminal echo disabled, `PAM_PROMPT_ECHO_ON`
//! prompts to stderr and reads from stdin, `PAM_ERROR_MSG`/`PAM_TEXT_INFO`
//! write to stderr/stdout with a trailing newline enforced, and any other
//! style fails the whole batch — previously collected responses are zeroed
//! before being dropped.

use std::io::{self, BufRead, Write};

use wire::{ConvMessage, ConvResponse};
use zeroize::Zeroize;

/// The four message styles the reference conversation function handles.
/// Any other raw style value is a protocol violation, not a style this
/// crate tries to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    PromptEchoOff,
    PromptEchoOn,
    ErrorMsg,
    TextInfo,
}

impl Style {
    #[must_use]
    pub const fn from_i32(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::PromptEchoOff),
            2 => Some(Self::PromptEchoOn),
            3 => Some(Self::ErrorMsg),
            4 => Some(Self::TextInfo),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConvError {
    #[error("conversation message style {0} is not one of the four known styles")]
    UnknownStyle(i32),
    #[error("empty or oversized message batch")]
    BadBatchSize,
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Upper bound on a single conversation batch, mirroring `PAM_MAX_NUM_MSG`.
pub const MAX_NUM_MSG: usize = 32;

/// Disables and restores terminal echo around a `PAM_PROMPT_ECHO_OFF` read.
/// Abstracted behind a trait so the line-reading logic below can be
/// exercised without a real controlling terminal.
pub trait EchoControl {
    fn disable_echo(&mut self) -> io::Result<()>;
    fn restore_echo(&mut self) -> io::Result<()>;
}

/// No-op echo control for tests and for callers that have already arranged
/// their own terminal state.
#[derive(Debug, Default)]
pub struct NoEchoControl;

impl EchoControl for NoEchoControl {
    fn disable_echo(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn restore_echo(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
pub mod termios_echo {
    use std::io;
    use std::os::fd::{AsFd, BorrowedFd};

    use nix::sys::termios::{self, LocalFlags, SetArg, Termios};

    use super::EchoControl;

    /// Disables `ECHO` on a real terminal fd (typically stdin) for the
    /// duration of a `PAM_PROMPT_ECHO_OFF` read, restoring the saved
    /// attributes afterward — the portable equivalent of `getpass(3)`.
    pub struct TerminalEcho<'a> {
        fd: BorrowedFd<'a>,
        saved: Option<Termios>,
    }

    impl<'a> TerminalEcho<'a> {
        #[must_use]
        pub fn new(fd: BorrowedFd<'a>) -> Self {
            Self { fd, saved: None }
        }
    }

    impl EchoControl for TerminalEcho<'_> {
        fn disable_echo(&mut self) -> io::Result<()> {
            let mut attrs = termios::tcgetattr(self.fd).map_err(io::Error::from)?;
            self.saved = Some(attrs.clone());
            attrs.local_flags.remove(LocalFlags::ECHO);
            termios::tcsetattr(self.fd, SetArg::TCSAFLUSH, &attrs).map_err(io::Error::from)?;
            Ok(())
        }

        fn restore_echo(&mut self) -> io::Result<()> {
            if let Some(attrs) = self.saved.take() {
                termios::tcsetattr(self.fd, SetArg::TCSAFLUSH, &attrs)
                    .map_err(io::Error::from)?;
            }
            Ok(())
        }
    }

    #[must_use]
    pub fn stdin_echo() -> TerminalEcho<'static> {
        // stdin's fd 0 is valid for the process lifetime; `as_fd` would tie
        // the borrow to a temporary `Stdin`, so this builds the
        // `BorrowedFd` directly.
        TerminalEcho::new(unsafe { BorrowedFd::borrow_raw(0) })
    }
}

/// Runs one conversation batch against the given reader/writers, using
/// `echo` to suspend terminal echo for `PAM_PROMPT_ECHO_OFF` prompts.
///
/// On any failure — an unknown style, an I/O error, or a read returning no
/// line at all — every response text collected so far is zeroed before the
/// error is returned, matching the reference implementation's cleanup path.
pub fn converse<R: BufRead, E: EchoControl>(
    messages: &[ConvMessage],
    stdin: &mut R,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    echo: &mut E,
) -> Result<Vec<ConvResponse>, ConvError> {
    if messages.is_empty() || messages.len() > MAX_NUM_MSG {
        return Err(ConvError::BadBatchSize);
    }

    let mut responses: Vec<ConvResponse> = Vec::with_capacity(messages.len());

    for message in messages {
        let result = handle_one(message, stdin, stdout, stderr, echo);
        match result {
            Ok(response) => responses.push(response),
            Err(err) => {
                for response in &mut responses {
                    if let Some(text) = response.text.as_mut() {
                        text.zeroize();
                    }
                }
                return Err(err);
            }
        }
    }

    Ok(responses)
}

fn handle_one<R: BufRead, E: EchoControl>(
    message: &ConvMessage,
    stdin: &mut R,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    echo: &mut E,
) -> Result<ConvResponse, ConvError> {
    let style = Style::from_i32(message.style).ok_or(ConvError::UnknownStyle(message.style))?;
    match style {
        Style::PromptEchoOff => {
            stderr.write_all(&message.text)?;
            stderr.flush()?;
            echo.disable_echo()?;
            let line = read_line(stdin);
            echo.restore_echo()?;
            let line = line?;
            Ok(ConvResponse {
                retcode: 0,
                text: Some(line),
            })
        }
        Style::PromptEchoOn => {
            stderr.write_all(&message.text)?;
            stderr.flush()?;
            let line = read_line(stdin)?;
            Ok(ConvResponse {
                retcode: 0,
                text: Some(line),
            })
        }
        Style::ErrorMsg => {
            write_with_trailing_newline(stderr, &message.text)?;
            Ok(ConvResponse {
                retcode: 0,
                text: None,
            })
        }
        Style::TextInfo => {
            write_with_trailing_newline(stdout, &message.text)?;
            Ok(ConvResponse {
                retcode: 0,
                text: None,
            })
        }
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(line.into_bytes())
}

fn write_with_trailing_newline<W: Write>(out: &mut W, text: &[u8]) -> io::Result<()> {
    out.write_all(text)?;
    if text.last() != Some(&b'\n') {
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// The production entry point: reads from stdin, prompts on stderr, writes
/// info text to stdout, toggling real terminal echo for hidden prompts.
#[cfg(unix)]
pub fn default_conversation(messages: &[ConvMessage]) -> Result<Vec<ConvResponse>, ConvError> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let mut echo = termios_echo::stdin_echo();
    converse(messages, &mut reader, &mut stdout, &mut stderr, &mut echo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn prompt_echo_on_reads_a_line_from_stdin() {
        let messages = vec![ConvMessage {
            style: 2,
            text: b"Username: ".to_vec(),
        }];
        let mut stdin = Cursor::new(b"tomas\n".to_vec());
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut echo = NoEchoControl;
        let responses = converse(&messages, &mut stdin, &mut stdout, &mut stderr, &mut echo)
            .expect("conversation succeeds");
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].text.as_deref(), Some(&b"tomas"[..]));
        assert_eq!(stderr, b"Username: ");
    }

    #[test]
    fn error_msg_gets_a_trailing_newline_even_without_one() {
        let messages = vec![ConvMessage {
            style: 3,
            text: b"something went wrong".to_vec(),
        }];
        let mut stdin = Cursor::new(Vec::new());
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut echo = NoEchoControl;
        let responses = converse(&messages, &mut stdin, &mut stdout, &mut stderr, &mut echo)
            .unwrap();
        assert_eq!(responses[0].text, None);
        assert_eq!(stderr, b"something went wrong\n");
    }

    #[test]
    fn text_info_does_not_duplicate_an_existing_newline() {
        let messages = vec![ConvMessage {
            style: 4,
            text: b"all good\n".to_vec(),
        }];
        let mut stdin = Cursor::new(Vec::new());
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut echo = NoEchoControl;
        converse(&messages, &mut stdin, &mut stdout, &mut stderr, &mut echo).unwrap();
        assert_eq!(stdout, b"all good\n");
    }

    #[test]
    fn unknown_style_fails_the_whole_batch_and_zeroes_prior_responses() {
        let messages = vec![
            ConvMessage {
                style: 2,
                text: b"Username: ".to_vec(),
            },
            ConvMessage {
                style: 99,
                text: b"???".to_vec(),
            },
        ];
        let mut stdin = Cursor::new(b"tomas\n".to_vec());
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut echo = NoEchoControl;
        let err = converse(&messages, &mut stdin, &mut stdout, &mut stderr, &mut echo)
            .unwrap_err();
        assert!(matches!(err, ConvError::UnknownStyle(99)));
    }

    #[test]
    fn empty_batch_is_rejected() {
        let mut stdin = Cursor::new(Vec::new());
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut echo = NoEchoControl;
        let err = converse(&[], &mut stdin, &mut stdout, &mut stderr, &mut echo).unwrap_err();
        assert!(matches!(err, ConvError::BadBatchSize));
    }
}

use core::fmt::{self, Display, Formatter};
use std::borrow::Cow;

use reverb_common::status::Status;

/// A reply to the peer. More than one line is written in the
/// `250-first` / `250 last` continuation form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub lines: Vec<Cow<'static, str>>,
}

impl Reply {
    pub fn new(status: Status, line: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            lines: vec![line.into()],
        }
    }

    pub fn multi(status: Status, lines: Vec<Cow<'static, str>>) -> Self {
        Self { status, lines }
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let last = self.lines.len().saturating_sub(1);

        if self.lines.is_empty() {
            return write!(f, "{}", self.status);
        }

        for (idx, line) in self.lines.iter().enumerate() {
            // Peers must never see a bare CR or LF inside a reply line.
            let line = line.replace(['\r', '\n'], " ");
            if idx == last {
                write!(f, "{} {line}", self.status)?;
            } else {
                write!(f, "{}-{line}\r\n", self.status)?;
            }
        }

        Ok(())
    }
}

use core::fmt::{self, Display, Formatter};
use std::borrow::Cow;

use ahash::AHashMap;
use phf::phf_map;
use reverb_common::address::{self, Mailbox};
use thiserror::Error;

/// ESMTP parameters from `MAIL FROM` (RFC 5321 Section 3.3).
///
/// Only SIZE is acted on. The rest are kept so they can be logged.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct MailParameters {
    params: AHashMap<Cow<'static, str>, Option<String>>,
}

static KNOWN_PARAMS: phf::Map<&'static str, &'static str> = phf_map! {
    "SIZE" => "SIZE",
    "BODY" => "BODY",
    "AUTH" => "AUTH",
    "RET" => "RET",
    "ENVID" => "ENVID",
    "SMTPUTF8" => "SMTPUTF8",
};

fn normalize_key(key: &str) -> Cow<'static, str> {
    let upper = key.to_ascii_uppercase();

    KNOWN_PARAMS
        .get(upper.as_str())
        .map_or(Cow::Owned(upper), |&known| Cow::Borrowed(known))
}

impl MailParameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `KEY=VALUE` and bare `FLAG` tokens. Keys are case-insensitive.
    ///
    /// # Errors
    ///
    /// Duplicate keys, and a SIZE that is zero or not a number.
    pub fn from_params_str(params_str: &str) -> Result<Self, String> {
        let mut params = Self::new();

        for token in params_str.split_whitespace() {
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (normalize_key(key), Some(value)),
                None => (normalize_key(token), None),
            };

            if params.params.contains_key(&key) {
                return Err(format!("Duplicate parameter '{key}' not allowed"));
            }

            if key == "SIZE" {
                match value.map(str::parse::<usize>) {
                    Some(Ok(0)) => return Err(String::from("SIZE=0 is not allowed")),
                    Some(Ok(_)) => {}
                    _ => return Err(format!("Invalid SIZE value: {}", value.unwrap_or(""))),
                }
            }

            params.params.insert(key, value.map(str::to_string));
        }

        Ok(params)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.params.insert(normalize_key(key), Some(value.into()));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(&normalize_key(key))?.as_deref()
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.params.contains_key(&normalize_key(key))
    }

    /// The declared message size (RFC 1870), if any.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.get("SIZE")?.parse().ok()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl Display for MailParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.params {
            if !first {
                f.write_str(" ")?;
            }
            first = false;

            match value {
                None => f.write_str(key)?,
                Some(value) => write!(f, "{key}={value}")?,
            }
        }
        Ok(())
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl HeloVariant {
    #[must_use]
    pub fn client_id(&self) -> &str {
        match self {
            Self::Ehlo(id) | Self::Helo(id) => id,
        }
    }
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Command {
    Helo(HeloVariant),
    /// `None` is the null reverse-path.
    MailFrom(Option<Mailbox>, MailParameters),
    RcptTo(Mailbox),
    Data,
    Rset,
    Noop,
    Vrfy,
    Help,
    StartTls,
    Quit,
}

/// Why a command line was rejected. Maps onto 500 and 501 replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("command not recognized")]
    Unrecognised(String),

    #[error("{0}")]
    Syntax(String),
}

impl Command {
    /// The declared SIZE of a `MAIL FROM`, if present.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::MailFrom(_, params) => params.size(),
            _ => None,
        }
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(variant) => write!(fmt, "{variant} {}", variant.client_id()),
            Self::MailFrom(sender, params) => {
                let sender = sender.as_ref().map(ToString::to_string).unwrap_or_default();
                if params.is_empty() {
                    write!(fmt, "MAIL FROM:<{sender}>")
                } else {
                    write!(fmt, "MAIL FROM:<{sender}> {params}")
                }
            }
            Self::RcptTo(rcpt) => write!(fmt, "RCPT TO:<{rcpt}>"),
            Self::Data => fmt.write_str("DATA"),
            Self::Rset => fmt.write_str("RSET"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Vrfy => fmt.write_str("VRFY"),
            Self::Help => fmt.write_str("HELP"),
            Self::StartTls => fmt.write_str("STARTTLS"),
            Self::Quit => fmt.write_str("QUIT"),
        }
    }
}

/// Case-insensitive prefix strip that never splits a UTF-8 sequence.
fn strip_prefix_ignore_case<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let head = input.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &input[prefix.len()..])
}

/// Matches a verb that may be followed by an argument, e.g. `NOOP` or `HELP DATA`.
fn is_verb(input: &str, verb: &str) -> bool {
    strip_prefix_ignore_case(input, verb)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(command: &str) -> Result<Self, Self::Error> {
        let trimmed = command.trim();

        if let Some(rest) = strip_prefix_ignore_case(trimmed, "MAIL FROM:") {
            let rest = rest.trim();
            if rest.is_empty() {
                return Err(CommandError::Syntax("MAIL FROM requires a reverse-path".into()));
            }

            let (path, params) = rest
                .split_once(char::is_whitespace)
                .unwrap_or((rest, ""));

            let params = MailParameters::from_params_str(params).map_err(CommandError::Syntax)?;
            let sender = address::parse_reverse_path(path)
                .map_err(|err| CommandError::Syntax(err.to_string()))?;

            Ok(Self::MailFrom(sender, params))
        } else if let Some(rest) = strip_prefix_ignore_case(trimmed, "RCPT TO:") {
            let rest = rest.trim();
            if rest.is_empty() {
                return Err(CommandError::Syntax("RCPT TO requires a forward-path".into()));
            }

            // RCPT parameters (NOTIFY, ORCPT) are accepted and ignored.
            let path = rest.split_whitespace().next().unwrap_or(rest);
            address::parse_forward_path(path)
                .map(Self::RcptTo)
                .map_err(|err| CommandError::Syntax(err.to_string()))
        } else if is_verb(trimmed, "EHLO") || is_verb(trimmed, "HELO") {
            match trimmed.split_once(char::is_whitespace) {
                None => Err(CommandError::Syntax(format!("Expected hostname in {trimmed}"))),
                Some((verb, host)) if verb.eq_ignore_ascii_case("HELO") => {
                    Ok(Self::Helo(HeloVariant::Helo(host.trim().to_string())))
                }
                Some((_, host)) => Ok(Self::Helo(HeloVariant::Ehlo(host.trim().to_string()))),
            }
        } else if trimmed.eq_ignore_ascii_case("DATA") {
            Ok(Self::Data)
        } else if trimmed.eq_ignore_ascii_case("RSET") {
            Ok(Self::Rset)
        } else if trimmed.eq_ignore_ascii_case("QUIT") {
            Ok(Self::Quit)
        } else if trimmed.eq_ignore_ascii_case("STARTTLS") {
            Ok(Self::StartTls)
        } else if is_verb(trimmed, "NOOP") {
            Ok(Self::Noop)
        } else if is_verb(trimmed, "VRFY") {
            Ok(Self::Vrfy)
        } else if is_verb(trimmed, "HELP") {
            Ok(Self::Help)
        } else {
            Err(CommandError::Unrecognised(trimmed.to_owned()))
        }
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = CommandError;

    fn try_from(command: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(command).map_or_else(
            |_| Err(CommandError::Unrecognised(String::from_utf8_lossy(command).into_owned())),
            Self::try_from,
        )
    }
}

impl TryFrom<String> for Command {
    type Error = CommandError;

    fn try_from(command: String) -> Result<Self, Self::Error> {
        Self::try_from(command.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use pretty_assertions::assert_eq;
    use reverb_common::address::Mailbox;

    use super::{Command, CommandError, HeloVariant, MailParameters};

    // Idea copied from https://gitlab.com/erichdongubler-experiments/rust_case_permutations/blob/master/src/lib.rs#L97
    fn string_casing(string: &str) -> impl Iterator<Item = String> {
        let len = string.len();
        let num_cases = usize::pow(2, u32::try_from(len).unwrap_or(0));

        let (upper, lower) = string.chars().fold(
            (Vec::with_capacity(len), Vec::with_capacity(len)),
            |(mut upper, mut lower), c| {
                upper.push(c.to_ascii_uppercase());
                lower.push(c.to_ascii_lowercase());
                (upper, lower)
            },
        );

        (0..num_cases).map(move |i| {
            (0..len).fold(String::with_capacity(len), |mut s, idx| {
                if (i & (1 << idx)) == 0 {
                    s.push(lower[idx]);
                } else {
                    s.push(upper[idx]);
                }
                s
            })
        })
    }

    fn mailbox(local_part: &str, domain: &str) -> Mailbox {
        Mailbox {
            local_part: local_part.to_string(),
            domain: domain.to_string(),
        }
    }

    #[test]
    fn mail_from_command() {
        assert_eq!(
            Command::try_from("Mail From:<test@gmail.com>"),
            Ok(Command::MailFrom(
                Some(mailbox("test", "gmail.com")),
                MailParameters::new()
            ))
        );

        assert_eq!(
            Command::try_from("MAIL FROM: test@gmail.com"),
            Ok(Command::MailFrom(
                Some(mailbox("test", "gmail.com")),
                MailParameters::new()
            ))
        );

        assert!(matches!(
            Command::try_from("Mail From:"),
            Err(CommandError::Syntax(_))
        ));
        assert!(Command::try_from("Mail FROM:dasdas").is_err());
        assert!(matches!(
            Command::try_from("Mail FROM dasdas"),
            Err(CommandError::Unrecognised(_))
        ));

        assert_eq!(
            Command::try_from("MAIL FROM: <>"),
            Ok(Command::MailFrom(None, MailParameters::new()))
        );

        let mut params = MailParameters::new();
        params.insert("SIZE", "12345");
        assert_eq!(
            Command::try_from("MAIL FROM:<test@gmail.com> SIZE=12345"),
            Ok(Command::MailFrom(Some(mailbox("test", "gmail.com")), params))
        );

        for comm in string_casing("mail from") {
            assert!(matches!(
                Command::try_from(format!("{comm}:<test@gmail.com>")),
                Ok(Command::MailFrom(_, params)) if params.is_empty()
            ));
        }
    }

    #[test]
    fn mail_from_size_edge_cases() {
        for line in [
            "MAIL FROM:<test@example.com> SIZE=0",
            "MAIL FROM:<test@example.com> SIZE=",
            "MAIL FROM:<test@example.com> SIZE",
            "MAIL FROM:<test@example.com> SIZE=abc",
            "MAIL FROM:<test@example.com> SIZE=1000 SIZE=2000",
            "MAIL FROM:<test@example.com> size=1000 SiZe=2000",
        ] {
            assert!(
                matches!(Command::try_from(line), Err(CommandError::Syntax(_))),
                "{line}"
            );
        }

        let command = Command::try_from("MAIL FROM:<test@example.com> SiZe=3000 BODY=8BITMIME").unwrap();
        assert_eq!(command.size(), Some(3000));
        let Command::MailFrom(_, params) = command else {
            panic!("expected MAIL FROM");
        };
        assert_eq!(params.get("body"), Some("8BITMIME"));
        assert!(params.has("Size"));

        assert_eq!(
            Command::try_from("MAIL FROM:<> SIZE=500").unwrap().size(),
            Some(500)
        );
        assert_eq!(Command::Data.size(), None);
    }

    #[test]
    fn rcpt_to_command() {
        assert_eq!(
            Command::try_from("Rcpt To:<test@gmail.com>"),
            Ok(Command::RcptTo(mailbox("test", "gmail.com")))
        );

        assert_eq!(
            Command::try_from("RCPT TO:<echo@example.com> NOTIFY=NEVER"),
            Ok(Command::RcptTo(mailbox("echo", "example.com")))
        );

        assert!(Command::try_from("Rcpt To:").is_err());
        assert!(Command::try_from("RCPT TO:<>").is_err());
        assert!(Command::try_from("RCPT TO:dasdsa").is_err());
        assert!(Command::try_from("RCPT TO dasdsa").is_err());

        for comm in string_casing("rcpt to") {
            assert!(matches!(
                Command::try_from(format!("{comm}: test@gmail.com")),
                Ok(Command::RcptTo(_))
            ));
        }
    }

    #[test]
    fn helo_ehlo_command() {
        assert!(Command::try_from("EHLO").is_err());
        assert!(Command::try_from("HELO").is_err());

        assert_eq!(
            Command::try_from("EHLO client.example.org"),
            Ok(Command::Helo(HeloVariant::Ehlo(String::from(
                "client.example.org"
            ))))
        );

        assert_eq!(
            Command::try_from("helo   client.example.org  "),
            Ok(Command::Helo(HeloVariant::Helo(String::from(
                "client.example.org"
            ))))
        );

        assert!(matches!(
            Command::try_from("EHLOclient"),
            Err(CommandError::Unrecognised(_))
        ));
    }

    #[test]
    fn simple_verbs() {
        for (input, expected) in [
            ("DATA", Command::Data),
            ("rset", Command::Rset),
            ("Quit", Command::Quit),
            ("STARTTLS", Command::StartTls),
            ("NOOP", Command::Noop),
            ("noop anything", Command::Noop),
            ("VRFY postmaster", Command::Vrfy),
            ("HELP", Command::Help),
            ("help data", Command::Help),
        ] {
            assert_eq!(Command::try_from(input), Ok(expected), "{input}");
        }

        assert!(matches!(
            Command::try_from("DATA now"),
            Err(CommandError::Unrecognised(_))
        ));
        assert!(matches!(
            Command::try_from("AUTH PLAIN"),
            Err(CommandError::Unrecognised(_))
        ));
    }

    #[test]
    fn non_ascii_input_does_not_panic() {
        assert!(Command::try_from("MAIL FRÖM:<a@b.c>").is_err());
        assert!(Command::try_from("ÉHLO").is_err());
        assert!(Command::try_from([0xff_u8, 0xfe].as_slice()).is_err());
    }

    #[test]
    fn display_round_trips_paths() {
        let command = Command::try_from("mail from:<a@example.com>").unwrap();
        assert_eq!(command.to_string(), "MAIL FROM:<a@example.com>");
        assert_eq!(
            Command::try_from("MAIL FROM:<>").unwrap().to_string(),
            "MAIL FROM:<>"
        );
        assert_eq!(
            Command::try_from("ehlo me").unwrap().to_string(),
            "EHLO me"
        );
    }
}

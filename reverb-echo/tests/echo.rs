//! End to end: inbound message in, reply captured at the delivery seam.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use mailparse::{MailHeaderMap, parse_mail};
use pretty_assertions::assert_eq;
use reverb_common::{CancelScope, Cancelled, InboundMessage, traits::Processor};
use reverb_delivery::{Deliver, DeliveryAttempt, DeliveryError, recipient_domain};
use reverb_echo::{
    DkimConfig, EchoError, ReplierIdentity, Replier, ReplyConfig,
    dkim::{SignError, Signer},
};

#[derive(Debug, Clone)]
struct Sent {
    recipient: String,
    message: Vec<u8>,
}

#[derive(Clone, Default)]
struct Capture {
    sent: Arc<Mutex<Vec<Sent>>>,
    fail: bool,
}

impl Capture {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Deliver for Capture {
    async fn deliver(
        &self,
        recipient: &str,
        message: &[u8],
        scope: &CancelScope,
    ) -> Result<DeliveryAttempt, DeliveryError> {
        scope.check()?;
        let domain = recipient_domain(recipient)?;

        if self.fail {
            return Err(DeliveryError::Exhausted {
                recipient: recipient.to_string(),
                attempts: vec![DeliveryAttempt::failed("mx.example.net", "550 no")],
                resolution: None,
            });
        }

        self.sent.lock().unwrap().push(Sent {
            recipient: recipient.to_string(),
            message: message.to_vec(),
        });
        Ok(DeliveryAttempt::delivered(domain))
    }
}

fn identity() -> ReplierIdentity {
    ReplierIdentity::new(
        "echo.example.com",
        &ReplyConfig {
            from_address: "Echo <echo@example.com>".to_string(),
            mail_from: "bounce@example.com".to_string(),
            from_name: None,
        },
    )
}

fn inbound(sender: &str, data: &str) -> InboundMessage {
    InboundMessage {
        sender: sender.to_string(),
        recipients: vec!["echo@example.com".to_string()],
        data: Arc::from(data.as_bytes()),
    }
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

const THREADED: &str = concat!(
    "From: Sender <from@example.net>\r\n",
    "To: echo@example.com\r\n",
    "Subject: Hello\r\n",
    "Message-ID: <m1@x>\r\n",
    "References: <root@x>\r\n",
    "Content-Type: multipart/alternative; boundary=b\r\n",
    "\r\n",
    "--b\r\n",
    "Content-Type: text/plain; charset=utf-8\r\n",
    "\r\n",
    "P\r\n",
    "--b\r\n",
    "Content-Type: text/html; charset=utf-8\r\n",
    "\r\n",
    "<b>H</b>\r\n",
    "--b--\r\n",
);

#[tokio::test]
async fn replies_in_thread_to_the_envelope_sender() {
    let capture = Capture::default();
    let replier = Replier::new(identity(), capture.clone());

    replier
        .echo(inbound("env@example.net", THREADED), CancelScope::new())
        .await
        .unwrap();

    let sent = capture.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "env@example.net");

    let reply = parse_mail(&sent[0].message).unwrap();
    assert_eq!(reply.headers.get_first_value("Subject").unwrap(), "Re: Hello");
    assert_eq!(reply.headers.get_first_value("In-Reply-To").unwrap(), "<m1@x>");
    assert_eq!(
        mailparse::msgidparse(&reply.headers.get_first_value("References").unwrap())
            .unwrap()
            .to_vec(),
        vec!["root@x", "m1@x"]
    );

    assert_eq!(reply.ctype.mimetype, "multipart/alternative");
    assert_eq!(reply.subparts[0].ctype.mimetype, "text/plain");
    assert_eq!(reply.subparts[0].get_body().unwrap().trim_end(), "P");
    assert_eq!(reply.subparts[1].ctype.mimetype, "text/html");
    assert_eq!(reply.subparts[1].get_body().unwrap().trim_end(), "<b>H</b>");
    assert!(reply.headers.get_first_value("DKIM-Signature").is_none());
}

#[tokio::test]
async fn null_sender_uses_reply_to() {
    let capture = Capture::default();
    let replier = Replier::new(identity(), capture.clone());

    let data = "Reply-To: r@x.net\r\nFrom: f@x.net\r\n\r\nping\r\n";
    replier.echo(inbound("", data), CancelScope::new()).await.unwrap();

    assert_eq!(capture.sent()[0].recipient, "r@x.net");
}

#[tokio::test]
async fn html_only_message_gets_synthesised_text() {
    let capture = Capture::default();
    let replier = Replier::new(identity(), capture.clone());

    let data = concat!(
        "From: f@x.net\r\n",
        "Content-Type: text/html\r\n",
        "\r\n",
        "<div>Hello <b>there</b>&amp;friends</div>",
    );
    replier.echo(inbound("", data), CancelScope::new()).await.unwrap();

    let sent = capture.sent();
    let reply = parse_mail(&sent[0].message).unwrap();
    assert_eq!(reply.headers.get_first_value("Subject").unwrap(), "Re:");
    assert_eq!(
        reply.subparts[0].get_body().unwrap().trim_end(),
        "Hello there &friends"
    );
}

#[tokio::test]
async fn no_recipient_sends_nothing() {
    let capture = Capture::default();
    let replier = Replier::new(identity(), capture.clone());

    let err = replier
        .echo(inbound("<>", "Subject: lost\r\n\r\nbody\r\n"), CancelScope::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EchoError::NoRecipient));
    assert_eq!(err.to_string(), "unable to determine reply recipient");
    assert!(capture.sent().is_empty());
}

#[tokio::test]
async fn malformed_envelope_sender_fails_at_delivery() {
    let capture = Capture::default();
    let replier = Replier::new(identity(), capture.clone());

    let err = replier
        .echo(inbound("user@", "From: f@x.net\r\n\r\nping\r\n"), CancelScope::new())
        .await
        .unwrap_err();

    assert!(
        matches!(&err, EchoError::Delivery(DeliveryError::Address(address)) if address == "user@"),
        "{err}"
    );
    assert!(capture.sent().is_empty());
}

#[tokio::test]
async fn undecodable_part_is_a_decode_error() {
    let capture = Capture::default();
    let replier = Replier::new(identity(), capture.clone());

    let data = concat!(
        "From: f@x.net\r\n",
        "Content-Type: text/plain\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "@@@@ not base64 @@@@\r\n",
    );
    let err = replier
        .echo(inbound("env@example.net", data), CancelScope::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EchoError::Decode(_)), "{err}");
    assert!(capture.sent().is_empty());
}

#[tokio::test]
async fn bad_from_address_is_a_compose_error() {
    let capture = Capture::default();
    let identity = ReplierIdentity::new(
        "echo.example.com",
        &ReplyConfig {
            from_address: "a@x, b@x".to_string(),
            mail_from: "bounce@example.com".to_string(),
            from_name: None,
        },
    );
    let replier = Replier::new(identity, capture.clone());

    let err = replier
        .echo(inbound("env@example.net", THREADED), CancelScope::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EchoError::Compose(_)), "{err}");
    assert!(capture.sent().is_empty());
}

#[tokio::test]
async fn delivery_failure_is_returned() {
    let replier = Replier::new(identity(), Capture::failing());

    let err = replier
        .echo(inbound("env@example.net", THREADED), CancelScope::new())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "delivery failed for env@example.net: mx.example.net: 550 no"
    );
}

#[tokio::test]
async fn cancelled_scope_is_reported() {
    let replier = Replier::new(identity(), Capture::default());
    let scope = CancelScope::new().with_deadline(tokio::time::Instant::now());

    let err = replier
        .echo(inbound("env@example.net", THREADED), scope)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EchoError::Delivery(DeliveryError::Cancelled(Cancelled::DeadlineExceeded))
    ));
}

#[tokio::test]
async fn signed_replies_carry_a_signature() {
    let signer = Signer::from_config(&DkimConfig {
        domain: "example.com".to_string(),
        selector: "reverb".to_string(),
        identifier: None,
        private_key_path: fixture("rsa_pkcs8.pem"),
    })
    .unwrap();

    let capture = Capture::default();
    let replier = Replier::new(identity(), capture.clone()).with_signer(signer);

    replier
        .echo(inbound("env@example.net", THREADED), CancelScope::new())
        .await
        .unwrap();

    let sent = capture.sent();
    assert!(sent[0].message.starts_with(b"DKIM-Signature:"));

    let reply = parse_mail(&sent[0].message).unwrap();
    let signature = reply.headers.get_first_value("DKIM-Signature").unwrap();
    assert!(signature.contains("d=example.com"), "{signature}");
}

#[test]
fn non_rsa_key_fails_initialisation() {
    let err = Signer::from_config(&DkimConfig {
        domain: "example.com".to_string(),
        selector: "reverb".to_string(),
        identifier: None,
        private_key_path: fixture("ed25519_pkcs8.pem"),
    })
    .unwrap_err();

    assert!(matches!(err, SignError::UnsupportedKey { .. }), "{err}");
}

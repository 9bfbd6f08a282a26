//! Direct delivery against a local mock exchanger.

mod support;

use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use reverb_common::{CancelScope, config::{ClientTimeouts, TlsPolicy}};
use reverb_delivery::{
    Deliver, DeliveryError, DirectDelivery, DnsError, MxRecord, MxResolver, SmtpDialer,
};
use support::mock_server::{MockSmtpServer, SmtpCommand};

/// Points every domain at the loopback mock.
struct Loopback;

#[async_trait]
impl MxResolver for Loopback {
    async fn lookup_mx(&self, _domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        Ok(vec![MxRecord::new(10, "127.0.0.1.")])
    }
}

const MESSAGE: &[u8] = b"Subject: Re: ping\r\n\r\nhello\r\n.leading dot\r\n";

fn delivery(
    server: &MockSmtpServer,
    policy: TlsPolicy,
    timeouts: ClientTimeouts,
) -> DirectDelivery<Loopback, SmtpDialer> {
    DirectDelivery::new(
        Loopback,
        SmtpDialer::new(server.addr().port(), timeouts),
        "echo.example.com",
        "bounce@echo.example.com",
    )
    .with_tls_policy(policy)
}

#[tokio::test]
async fn opportunistic_falls_back_to_plaintext_without_starttls() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let engine = delivery(&server, TlsPolicy::Opportunistic, ClientTimeouts::default());

    engine
        .deliver("rcpt@example.com", MESSAGE, &CancelScope::new())
        .await
        .unwrap();

    assert_eq!(
        server.commands().await,
        vec![
            SmtpCommand::Ehlo("echo.example.com".to_string()),
            SmtpCommand::Ehlo("echo.example.com".to_string()),
            SmtpCommand::MailFrom("FROM:<bounce@echo.example.com>".to_string()),
            SmtpCommand::RcptTo("TO:<rcpt@example.com>".to_string()),
            SmtpCommand::Data,
            SmtpCommand::MessageContent(
                b"Subject: Re: ping\r\n\r\nhello\r\n..leading dot\r\n".to_vec()
            ),
            SmtpCommand::Quit,
        ]
    );
}

#[tokio::test]
async fn plaintext_only_skips_the_encrypted_dial() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let engine = delivery(&server, TlsPolicy::Disabled, ClientTimeouts::default());

    engine
        .deliver("rcpt@example.com", MESSAGE, &CancelScope::new())
        .await
        .unwrap();

    let commands = server.commands().await;
    let ehlos = commands
        .iter()
        .filter(|command| matches!(command, SmtpCommand::Ehlo(_)))
        .count();
    assert_eq!(ehlos, 1);
    assert_eq!(server.messages().await.len(), 1);
}

#[tokio::test]
async fn required_tls_refuses_a_server_without_starttls() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let engine = delivery(&server, TlsPolicy::Required, ClientTimeouts::default());

    let err = engine
        .deliver("rcpt@example.com", MESSAGE, &CancelScope::new())
        .await
        .unwrap_err();

    assert!(
        err.to_string().contains("does not advertise STARTTLS"),
        "{err}"
    );
    assert!(server.messages().await.is_empty());
}

#[tokio::test]
async fn advertised_starttls_that_fails_falls_back() {
    let server = MockSmtpServer::builder()
        .with_ehlo_response(250, &["mock.example", "STARTTLS"])
        .build()
        .await
        .unwrap();
    let engine = delivery(&server, TlsPolicy::Opportunistic, ClientTimeouts::default());

    engine
        .deliver("rcpt@example.com", MESSAGE, &CancelScope::new())
        .await
        .unwrap();

    let commands = server.commands().await;
    assert_eq!(commands[1], SmtpCommand::StartTls);
    assert_eq!(server.messages().await.len(), 1);
}

#[tokio::test]
async fn rejected_recipient_is_reported() {
    let server = MockSmtpServer::builder()
        .with_rcpt_to_response(550, "5.1.1 User unknown")
        .build()
        .await
        .unwrap();
    let engine = delivery(&server, TlsPolicy::Disabled, ClientTimeouts::default());

    let err = engine
        .deliver("nobody@example.com", MESSAGE, &CancelScope::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Exhausted { .. }));
    assert_eq!(
        err.to_string(),
        "delivery failed for nobody@example.com: 127.0.0.1: 550 5.1.1 User unknown"
    );
}

#[tokio::test]
async fn quit_refusal_does_not_undo_acceptance() {
    let server = MockSmtpServer::builder()
        .with_quit_response(500, "confused")
        .build()
        .await
        .unwrap();
    let engine = delivery(&server, TlsPolicy::Disabled, ClientTimeouts::default());

    engine
        .deliver("rcpt@example.com", MESSAGE, &CancelScope::new())
        .await
        .unwrap();
    assert_eq!(server.messages().await.len(), 1);
}

#[tokio::test]
async fn silent_server_hits_the_stage_timeout() {
    let server = MockSmtpServer::builder()
        .stalling_after(2)
        .build()
        .await
        .unwrap();
    let timeouts = ClientTimeouts {
        rcpt_to_secs: 1,
        ..ClientTimeouts::default()
    };
    let engine = delivery(&server, TlsPolicy::Disabled, timeouts);

    let started = tokio::time::Instant::now();
    let err = engine
        .deliver("rcpt@example.com", MESSAGE, &CancelScope::new())
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        err.to_string(),
        "delivery failed for rcpt@example.com: 127.0.0.1: RCPT TO timed out after 1 seconds"
    );
}

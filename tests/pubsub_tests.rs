#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration tests for the STOMP adapter on its own.

mod common;

use std::time::Duration;

use common::*;
use snake_session_client::event::{InboundFrame, TransportEvent};
use snake_session_client::pubsub::{PubSubClient, PubSubConfig};
use snake_session_client::stomp::Command;
use snake_session_client::SessionError;
use tokio::sync::mpsc;

async fn next_transport_event(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("no transport event in time")
        .expect("transport event channel closed")
}

async fn connected_client() -> (PubSubClient, mpsc::Receiver<TransportEvent>, MockServer) {
    let (transport, mut server) = MockServer::accepting();
    let (client, events) = PubSubClient::connect(transport, PubSubConfig::new("game.local"))
        .await
        .unwrap();
    let connect = server.expect_connect().await;
    assert_eq!(connect.header("host"), Some("game.local"));
    (client, events, server)
}

#[tokio::test]
async fn messages_are_delivered_per_subscription() {
    let (client, mut events, mut server) = connected_client().await;

    let updates = client.subscribe("/topic/update/abc").unwrap();
    let frame = server.expect(Command::Subscribe).await;
    assert_eq!(frame.header("id"), Some(updates.id()));

    server.publish("/topic/update/abc", "{}");

    assert_eq!(
        next_transport_event(&mut events).await,
        TransportEvent::Message(InboundFrame {
            topic: "/topic/update/abc".into(),
            body: "{}".into(),
        })
    );
}

#[tokio::test]
async fn malformed_frame_does_not_drop_earlier_frames() {
    let (client, mut events, mut server) = connected_client().await;
    let updates = client.subscribe("/topic/update/abc").unwrap();
    server.expect(Command::Subscribe).await;

    server.send_raw(&format!(
        "MESSAGE\ndestination:/topic/update/abc\nsubscription:{}\n\n{{}}\0BOGUS\n\n\0",
        updates.id()
    ));
    assert_eq!(
        next_transport_event(&mut events).await,
        TransportEvent::Message(InboundFrame {
            topic: "/topic/update/abc".into(),
            body: "{}".into(),
        })
    );

    server.publish("/topic/update/abc", "[]");
    assert_eq!(
        next_transport_event(&mut events).await,
        TransportEvent::Message(InboundFrame {
            topic: "/topic/update/abc".into(),
            body: "[]".into(),
        })
    );
    assert!(client.is_connected());
}

#[tokio::test]
async fn messages_after_unsubscribe_are_dropped() {
    let (client, mut events, mut server) = connected_client().await;
    let highscores = client.subscribe("/topic/newHighscore").unwrap();
    server.expect(Command::Subscribe).await;

    client.unsubscribe(&highscores).unwrap();
    let frame = server.expect(Command::Unsubscribe).await;
    assert_eq!(frame.header("id"), Some(highscores.id()));
    assert_eq!(client.subscription_count(), 0);

    server.publish("/topic/newHighscore", "[]");
    let nothing = tokio::time::timeout(QUIET, events.recv()).await;
    assert!(nothing.is_err(), "unexpected event: {nothing:?}");
}

#[tokio::test]
async fn send_writes_destination_and_body() {
    let (client, _events, mut server) = connected_client().await;

    client.send("/app/move", "\"up\"").unwrap();

    let frame = server.expect(Command::Send).await;
    assert_eq!(frame.header("destination"), Some("/app/move"));
    assert_eq!(frame.header("content-length"), Some("4"));
    assert_eq!(frame.body, "\"up\"");
}

#[tokio::test]
async fn hang_up_emits_disconnected_and_rejects_sends() {
    let (client, mut events, mut server) = connected_client().await;

    server.hang_up();

    assert_eq!(
        next_transport_event(&mut events).await,
        TransportEvent::Disconnected { reason: None }
    );
    assert!(!client.is_connected());
    assert!(matches!(
        client.send("/app/reset", ""),
        Err(SessionError::SendFailure(_))
    ));
}

#[tokio::test]
async fn close_sends_disconnect_and_is_idempotent() {
    let (mut client, mut events, mut server) = connected_client().await;

    client.close().await;
    client.close().await;

    server.expect(Command::Disconnect).await;
    assert!(matches!(
        next_transport_event(&mut events).await,
        TransportEvent::Disconnected { .. }
    ));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn handshake_times_out_without_connected() {
    let (transport, mut server) = MockServer::silent();
    let config = PubSubConfig::new("localhost").with_connect_timeout(Duration::from_millis(50));

    let err = PubSubClient::connect(transport, config).await.unwrap_err();

    assert!(matches!(err, SessionError::Connection(_)));
    server.expect_connect().await;
}

// tests/session_tests.rs

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout};

use cmdbridge_core::Error;
use cmdbridge_core::eventbus::{ChatEvent, EventBus};
use cmdbridge_core::models::{ArgValue, CommandMode};
use cmdbridge_core::platforms::SessionState;
use cmdbridge_core::platforms::twitch_irc::ChatSession;

use test_utils::*;

const TIMEOUT: Duration = Duration::from_secs(10);

fn session_with(
    connector: Arc<dyn cmdbridge_core::platforms::Connector>,
    bus: &EventBus,
) -> ChatSession {
    ChatSession::new(
        session_config(TIMEOUT),
        connector,
        dispatcher(CommandMode::Cooldown, bus),
        bus.clone(),
    )
}

async fn next_server(rx: &mut tokio::sync::mpsc::UnboundedReceiver<tokio::io::DuplexStream>) -> FakeServer {
    let stream = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no connection attempt")
        .expect("connector dropped");
    FakeServer::new(stream)
}

/// Waits for the link's reader task to deliver a line, then handles it.
async fn read_one(session: &mut ChatSession) {
    timeout(Duration::from_secs(2), async {
        while !session.read_pending(Instant::now()).await {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("nothing arrived on the link");
}

#[tokio::test]
async fn connect_sends_framing_in_order() {
    let bus = EventBus::new();
    let (connector, mut servers) = DuplexConnector::new();
    let mut session = session_with(connector, &bus);
    assert_eq!(session.state(), SessionState::Disconnected);

    session.connect(Instant::now()).await;
    assert_eq!(session.state(), SessionState::Joining);
    assert!(session.is_connected());

    let mut server = next_server(&mut servers).await;
    assert_eq!(
        server.read_lines(4).await,
        vec![
            "PASS oauth:abc",
            "NICK danqzq",
            "JOIN #danqzq",
            "CAP REQ :twitch.tv/tags",
        ]
    );
}

#[tokio::test]
async fn ping_is_answered_with_same_payload() {
    let bus = EventBus::new();
    let (connector, mut servers) = DuplexConnector::new();
    let mut session = session_with(connector, &bus);
    session.connect(Instant::now()).await;
    let mut server = next_server(&mut servers).await;
    server.read_lines(4).await;

    server.send("PING :tmi.twitch.tv").await;
    read_one(&mut session).await;
    assert_eq!(server.read_line().await, "PONG :tmi.twitch.tv");
}

#[tokio::test]
async fn join_confirmation_is_reported_once() {
    let bus = EventBus::new();
    let mut events = bus.subscribe(None);
    let (connector, _servers) = DuplexConnector::new();
    let mut session = session_with(connector, &bus);
    let t0 = Instant::now();
    session.connect(t0).await;

    session.handle_line(JOIN_LINE, t0).await;
    session.handle_line(JOIN_LINE, t0).await;
    assert_eq!(session.state(), SessionState::Joined);

    let seen = drain(&mut events);
    assert_eq!(seen.len(), 1);
    assert!(matches!(seen[0], ChatEvent::JoinedChat));

    // the timeout was cancelled by the join
    session.on_tick(t0 + TIMEOUT * 3).await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(session.attempt(), 1);
}

#[tokio::test]
async fn missing_join_times_out_and_reconnects() {
    let bus = EventBus::new();
    let mut events = bus.subscribe(None);
    let (connector, mut servers) = DuplexConnector::new();
    let mut session = session_with(connector, &bus);
    let t0 = Instant::now();

    session.connect(t0).await;
    let _first = next_server(&mut servers).await;

    session.on_tick(t0 + Duration::from_secs(9)).await;
    assert!(drain(&mut events).is_empty());

    session.on_tick(t0 + TIMEOUT).await;
    let seen = drain(&mut events);
    assert_eq!(seen.len(), 1);
    assert!(matches!(seen[0], ChatEvent::FailedToConnect { attempt: 1 }));
    assert_eq!(session.attempt(), 2);
    assert_eq!(session.state(), SessionState::Joining);

    // a fresh connection with full framing
    let mut second = next_server(&mut servers).await;
    assert_eq!(second.read_line().await, "PASS oauth:abc");

    // same tick again fires nothing; the new attempt has its own window
    session.on_tick(t0 + TIMEOUT).await;
    assert!(drain(&mut events).is_empty());
    session.on_tick(t0 + TIMEOUT * 2).await;
    let seen = drain(&mut events);
    assert!(matches!(seen.as_slice(), [ChatEvent::FailedToConnect { attempt: 2 }]));
}

#[tokio::test]
async fn refused_connect_is_retried_at_the_deadline() {
    let bus = EventBus::new();
    let mut events = bus.subscribe(None);
    let mut session = session_with(Arc::new(RefusingConnector), &bus);
    let t0 = Instant::now();

    session.connect(t0).await;
    assert_eq!(session.state(), SessionState::Connecting);
    assert!(!session.is_connected());
    assert!(!session.read_pending(t0).await);

    session.on_tick(t0 + TIMEOUT).await;
    let seen = drain(&mut events);
    assert!(matches!(seen.as_slice(), [ChatEvent::FailedToConnect { attempt: 1 }]));
    assert_eq!(session.attempt(), 2);
}

#[tokio::test]
async fn sent_messages_are_echoed_locally() {
    let bus = EventBus::new();
    let mut events = bus.subscribe(None);
    let (connector, mut servers) = DuplexConnector::new();
    let mut session = session_with(connector, &bus);

    let err = session.send_chat_message("too early").await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));

    session.connect(Instant::now()).await;
    let mut server = next_server(&mut servers).await;
    server.read_lines(4).await;

    session.send_chat_message("Hello Chat").await.unwrap();
    assert_eq!(server.read_line().await, "PRIVMSG #danqzq :Hello Chat");

    match drain(&mut events).as_slice() {
        [ChatEvent::MessageReceived { user, text, .. }] => {
            assert_eq!(user.display_name, "DanQZQ");
            assert_eq!(text, "Hello Chat");
        }
        other => panic!("unexpected events: {:?}", other),
    }
}

#[tokio::test]
async fn chat_commands_reach_bound_handlers() {
    let bus = EventBus::new();
    let mut events = bus.subscribe(None);
    let (connector, _servers) = DuplexConnector::new();
    let mut session = session_with(connector, &bus);
    let rec = Arc::new(Recorder::default());
    session.dispatcher_mut().register_handler(rec.clone(), "Player");
    let t0 = Instant::now();

    session.handle_line(&privmsg("!give 7"), t0).await;
    let call = rec.last().expect("give should run");
    assert_eq!(call.args[1], ArgValue::Int(7));

    let seen = drain(&mut events);
    assert!(matches!(seen[0], ChatEvent::MessageReceived { ref text, .. } if text == "!give 7"));
    assert!(matches!(seen[1], ChatEvent::CommandReceived { ref command, .. } if command.name == "give"));

    // bad arity stays connected and keeps processing
    session.handle_line(&privmsg("!give"), t0).await;
    session.handle_line(&privmsg("!j"), t0).await;
    session.handle_line(&privmsg("!j"), t0).await;
    assert_eq!(rec.count(), 2);
    assert_eq!(session.commands_on_cooldown(), vec!["join"]);
}

#[tokio::test]
async fn malformed_and_unknown_lines_are_dropped() {
    let bus = EventBus::new();
    let mut events = bus.subscribe(None);
    let (connector, _servers) = DuplexConnector::new();
    let mut session = session_with(connector, &bus);
    let t0 = Instant::now();

    session.handle_line(":danqzq!danqzq@danqzq.tmi.twitch.tv PRIVMSG #danqzq :no tags", t0).await;
    session.handle_line(":tmi.twitch.tv 001 danqzq :Welcome, GLHF!", t0).await;
    session.handle_line(":tmi.twitch.tv CAP * ACK :twitch.tv/tags", t0).await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn lost_socket_after_join_reconnects_immediately() {
    let bus = EventBus::new();
    let (connector, mut servers) = DuplexConnector::new();
    let mut session = session_with(connector, &bus);
    let t0 = Instant::now();
    session.connect(t0).await;
    let mut server = next_server(&mut servers).await;
    server.read_lines(4).await;
    server.send(JOIN_LINE).await;
    read_one(&mut session).await;
    assert_eq!(session.state(), SessionState::Joined);

    drop(server);
    read_one(&mut session).await;
    assert_eq!(session.attempt(), 2);
    assert_eq!(session.state(), SessionState::Joining);

    let mut again = next_server(&mut servers).await;
    assert_eq!(again.read_line().await, "PASS oauth:abc");
}

#[tokio::test]
async fn hangup_before_join_waits_for_the_deadline() {
    let bus = EventBus::new();
    let mut events = bus.subscribe(None);
    let connector = Arc::new(HangupConnector::default());
    let mut session = session_with(connector.clone(), &bus);
    let t0 = Instant::now();

    session.connect(t0).await;
    read_one(&mut session).await;
    assert_eq!(session.state(), SessionState::Connecting);
    assert!(!session.is_connected());
    assert_eq!(session.attempt(), 1);
    assert!(!session.read_pending(t0).await);

    session.on_tick(t0 + Duration::from_secs(9)).await;
    assert_eq!(connector.attempts(), 1);
    assert!(drain(&mut events).is_empty());

    session.on_tick(t0 + TIMEOUT).await;
    let seen = drain(&mut events);
    assert!(matches!(seen.as_slice(), [ChatEvent::FailedToConnect { attempt: 1 }]));
    assert_eq!(connector.attempts(), 2);

    // the second hangup also waits out a full window
    read_one(&mut session).await;
    session.on_tick(t0 + TIMEOUT).await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn hanging_up_server_is_retried_once_per_window() {
    let bus = EventBus::new();
    let mut events = bus.subscribe(None);
    let connector = Arc::new(HangupConnector::default());
    let session = session_with(connector.clone(), &bus);
    let task = tokio::spawn(session.run(bus.shutdown_signal()));

    tokio::time::sleep(TIMEOUT * 2 + TIMEOUT / 2).await;
    bus.shutdown();
    task.await.unwrap();

    let failures: Vec<u64> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            ChatEvent::FailedToConnect { attempt } => Some(attempt),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![1, 2]);
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn stalled_subscriber_does_not_stop_the_session() {
    let bus = EventBus::new();
    let _stalled = bus.subscribe(Some(2));
    let (connector, mut servers) = DuplexConnector::new();
    let session = session_with(connector, &bus);
    let task = tokio::spawn(session.run(bus.shutdown_signal()));

    let mut server = next_server(&mut servers).await;
    server.read_lines(4).await;
    server.send(JOIN_LINE).await;
    for n in 0..5 {
        server.send(&privmsg(&format!("hello {}", n))).await;
    }
    server.send("PING :tmi.twitch.tv").await;
    assert_eq!(server.read_line().await, "PONG :tmi.twitch.tv");

    bus.shutdown();
    timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn disabled_session_leaves_socket_unread() {
    let bus = EventBus::new();
    let (connector, mut servers) = DuplexConnector::new();
    let mut session = session_with(connector, &bus);
    session.connect(Instant::now()).await;
    let mut server = next_server(&mut servers).await;
    server.read_lines(4).await;

    session.set_commands_enabled(false);
    server.send("PING :x").await;
    tokio::task::yield_now().await;
    assert!(!session.read_pending(Instant::now()).await);

    session.set_commands_enabled(true);
    read_one(&mut session).await;
    assert_eq!(server.read_line().await, "PONG :x");
}

#[tokio::test]
async fn close_releases_everything() {
    let bus = EventBus::new();
    let (connector, _servers) = DuplexConnector::new();
    let mut session = session_with(connector, &bus);
    let t0 = Instant::now();
    session.connect(t0).await;
    session.handle_line(&privmsg("!j"), t0).await;
    assert_eq!(session.commands_on_cooldown(), vec!["join"]);

    session.close();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.is_connected());
    assert!(session.commands_on_cooldown().is_empty());
}

#[tokio::test]
async fn run_loop_serves_handle_requests() {
    let bus = EventBus::new();
    let mut events = bus.subscribe(None);
    let (connector, mut servers) = DuplexConnector::new();
    let session = session_with(connector, &bus);
    let handle = session.handle();
    let task = tokio::spawn(session.run(bus.shutdown_signal()));

    let mut server = next_server(&mut servers).await;
    server.read_lines(4).await;
    server.send(JOIN_LINE).await;

    let evt = timeout(Duration::from_secs(2), events.recv()).await.unwrap();
    assert!(matches!(evt, Some(ChatEvent::JoinedChat)));
    assert_eq!(handle.state().await.unwrap(), SessionState::Joined);

    handle.send_chat_message("hi").await.unwrap();
    assert_eq!(server.read_line().await, "PRIVMSG #danqzq :hi");

    handle.set_command_enabled("give", false).unwrap();
    let names: Vec<String> = handle
        .available_commands()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["join", "say"]);

    handle.shutdown().unwrap();
    timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    assert!(matches!(handle.state().await, Err(Error::NotConnected)));
}

#[tokio::test]
async fn bus_shutdown_stops_the_run_loop() {
    let bus = EventBus::new();
    let (connector, _servers) = DuplexConnector::new();
    let session = session_with(connector, &bus);
    let task = tokio::spawn(session.run(bus.shutdown_signal()));

    bus.shutdown();
    timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

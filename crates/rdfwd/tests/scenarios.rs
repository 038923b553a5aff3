//! Scenario-level integration tests exercising the `Forwarder` against
//! real loopback TCP sockets with an in-process mock agent channel
//! standing in for the outer transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use rdfwd::engine::constants::{BUFFER_SIZE, WINDOW_SIZE};
use rdfwd::{CommandSink, Forwarder};
use rdfwd_proto::{
    AcceptedMsg, AckMsg, CloseMsg, Command, ConnectMsg, DataMsg, ListenMsg, ShutdownMsg,
};

struct Captured {
    command: Command,
    payload: Vec<u8>,
}

/// A `CommandSink` that forwards every emitted command to an unbounded
/// channel the test can drain in order.
fn mock_sink() -> (CommandSink, mpsc::UnboundedReceiver<Captured>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink: CommandSink = Arc::new(move |command, payload: &[u8]| {
        let _ = tx.send(Captured {
            command,
            payload: payload.to_vec(),
        });
    });
    (sink, rx)
}

async fn recv_command(rx: &mut mpsc::UnboundedReceiver<Captured>) -> Captured {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an outbound command")
        .expect("sink channel closed unexpectedly")
}

async fn expect_silence(rx: &mut mpsc::UnboundedReceiver<Captured>) {
    let result = timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(result.is_err(), "expected no further outbound command");
}

/// Happy-path local->remote echo.
#[tokio::test]
async fn happy_path_local_to_remote_echo() {
    let (sink, mut rx) = mock_sink();
    let forwarder = Forwarder::new(sink);

    assert!(
        forwarder
            .associate_local("127.0.0.1:18801:echo.host:9000")
            .await
    );

    let mut client = TcpStream::connect("127.0.0.1:18801").await.unwrap();
    client.write_all(b"hello").await.unwrap();

    let connect_frame = recv_command(&mut rx).await;
    assert_eq!(connect_frame.command, Command::Connect);
    let connect_msg = ConnectMsg::decode(&connect_frame.payload).unwrap();
    assert_eq!(connect_msg.id, 0xFFFF_FFFF);
    assert_eq!(connect_msg.win_size, WINDOW_SIZE);
    assert_eq!(connect_msg.port, 9000);
    assert_eq!(connect_msg.address, "echo.host");

    let ack = AckMsg {
        id: connect_msg.id,
        size: 0,
        win_size: connect_msg.win_size,
    };
    forwarder.handle_message(Command::Ack as u32, &ack.encode());

    let data_frame = recv_command(&mut rx).await;
    assert_eq!(data_frame.command, Command::Data);
    let data_msg = DataMsg::decode(&data_frame.payload).unwrap();
    assert_eq!(data_msg.id, connect_msg.id);
    assert_eq!(data_msg.data, b"hello");

    let echo = DataMsg {
        id: connect_msg.id,
        data: b"hello".to_vec(),
    };
    forwarder.handle_message(Command::Data as u32, &echo.encode());

    let mut buf = [0u8; 5];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello");
}

/// Window stall and release. A read can overshoot the window by at most
/// one `BUFFER_SIZE` chunk (new reads are bounded, but one already-armed
/// read is not interrupted), so this asserts the stall point is within
/// that bound rather than exact equality.
#[tokio::test]
async fn window_stall_and_release() {
    let (sink, mut rx) = mock_sink();
    let forwarder = Forwarder::new(sink);

    assert!(
        forwarder
            .associate_local("127.0.0.1:18802:echo.host:9000")
            .await
    );

    let mut client = TcpStream::connect("127.0.0.1:18802").await.unwrap();

    let connect_frame = recv_command(&mut rx).await;
    let connect_msg = ConnectMsg::decode(&connect_frame.payload).unwrap();

    let ack = AckMsg {
        id: connect_msg.id,
        size: 0,
        win_size: 2 * WINDOW_SIZE,
    };
    forwarder.handle_message(Command::Ack as u32, &ack.encode());

    let overflow = 1000usize;
    let payload = vec![0xABu8; WINDOW_SIZE as usize + overflow];
    let write_task = tokio::spawn(async move {
        let _ = client.write_all(&payload).await;
        client
    });

    let mut total: u32 = 0;
    loop {
        let frame = recv_command(&mut rx).await;
        assert_eq!(frame.command, Command::Data);
        let data = DataMsg::decode(&frame.payload).unwrap();
        total += data.data.len() as u32;
        if total >= WINDOW_SIZE {
            break;
        }
    }
    assert!(
        total < WINDOW_SIZE + BUFFER_SIZE as u32,
        "overshoot past the window exceeded one buffered read"
    );

    expect_silence(&mut rx).await;

    let ack2 = AckMsg {
        id: connect_msg.id,
        size: total,
        win_size: 2 * WINDOW_SIZE,
    };
    forwarder.handle_message(Command::Ack as u32, &ack2.encode());

    let resumed = recv_command(&mut rx).await;
    assert_eq!(resumed.command, Command::Data);

    write_task.abort();
}

/// Concurrent close race: closing the local socket while a write is in
/// flight must emit CLOSE exactly once and drop late messages.
#[tokio::test]
async fn local_close_emits_close_once_and_drops_late_messages() {
    let (sink, mut rx) = mock_sink();
    let forwarder = Forwarder::new(sink);

    assert!(
        forwarder
            .associate_local("127.0.0.1:18803:echo.host:9000")
            .await
    );
    let client = TcpStream::connect("127.0.0.1:18803").await.unwrap();

    let connect_frame = recv_command(&mut rx).await;
    let connect_msg = ConnectMsg::decode(&connect_frame.payload).unwrap();

    let ack = AckMsg {
        id: connect_msg.id,
        size: 0,
        win_size: connect_msg.win_size,
    };
    forwarder.handle_message(Command::Ack as u32, &ack.encode());

    drop(client);

    let close_frame = recv_command(&mut rx).await;
    assert_eq!(close_frame.command, Command::Close);
    let close_msg = CloseMsg::decode(&close_frame.payload).unwrap();
    assert_eq!(close_msg.id, connect_msg.id);

    expect_silence(&mut rx).await;

    let late_data = DataMsg {
        id: connect_msg.id,
        data: b"late".to_vec(),
    };
    forwarder.handle_message(Command::Data as u32, &late_data.encode());
    forwarder.handle_message(Command::Ack as u32, &ack.encode());

    expect_silence(&mut rx).await;
}

/// Agent disconnect mid-traffic clears all state silently.
#[tokio::test]
async fn agent_disconnect_clears_state_silently() {
    let (sink, mut rx) = mock_sink();
    let forwarder = Forwarder::new(sink);

    let mut client_sockets = Vec::new();
    for i in 0..5u16 {
        let port = 18810 + i;
        assert!(
            forwarder
                .associate_local(&format!("127.0.0.1:{port}:echo.host:9000"))
                .await
        );
        let client = TcpStream::connect(format!("127.0.0.1:{port}")).await.unwrap();
        let frame = recv_command(&mut rx).await;
        assert_eq!(frame.command, Command::Connect);
        client_sockets.push(client);
    }

    forwarder.agent_disconnected();

    expect_silence(&mut rx).await;

    // A stray ACK referencing a torn-down id must be dropped, not panic.
    let stray = AckMsg {
        id: 0xFFFF_FFFF,
        size: 0,
        win_size: 1024,
    };
    forwarder.handle_message(Command::Ack as u32, &stray.encode());
    expect_silence(&mut rx).await;
}

/// Duplicate association replaces the rule.
#[tokio::test]
async fn duplicate_association_replaces_rule() {
    let (sink, mut rx) = mock_sink();
    let forwarder = Forwarder::new(sink);

    let listener_a = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port_a = listener_a.local_addr().unwrap().port();
    let listener_b = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port_b = listener_b.local_addr().unwrap().port();

    assert!(forwarder.associate_remote(&format!("0.0.0.0:5010:127.0.0.1:{port_a}")));
    let first = recv_command(&mut rx).await;
    assert_eq!(first.command, Command::Listen);
    let first_listen = ListenMsg::decode(&first.payload).unwrap();
    assert_eq!(first_listen.id, 5010);

    assert!(forwarder.associate_remote(&format!("0.0.0.0:5010:127.0.0.1:{port_b}")));
    let shutdown = recv_command(&mut rx).await;
    assert_eq!(shutdown.command, Command::Shutdown);
    let shutdown_msg = ShutdownMsg::decode(&shutdown.payload).unwrap();
    assert_eq!(shutdown_msg.listen_id, 5010);

    let second_listen_frame = recv_command(&mut rx).await;
    assert_eq!(second_listen_frame.command, Command::Listen);
    let second_listen = ListenMsg::decode(&second_listen_frame.payload).unwrap();
    assert_eq!(second_listen.id, 5010);
    assert_eq!(second_listen.address, "0.0.0.0");

    let accepted = AcceptedMsg {
        id: 42,
        listen_id: 5010,
        win_size: 2 * 1024 * 1024,
    };
    forwarder.handle_message(Command::Accepted as u32, &accepted.encode());

    let accept_result = timeout(Duration::from_secs(2), listener_b.accept()).await;
    assert!(
        accept_result.is_ok(),
        "expected the replaced association to target listener_b"
    );

    let nothing = timeout(Duration::from_millis(200), listener_a.accept()).await;
    assert!(nothing.is_err(), "listener_a should never have been dialed");
}

/// Malformed CONNECT: `ACCEPTED` for an unknown association.
#[tokio::test]
async fn accepted_for_unknown_association_closes() {
    let (sink, mut rx) = mock_sink();
    let forwarder = Forwarder::new(sink);

    let accepted = AcceptedMsg {
        id: 42,
        listen_id: 9999,
        win_size: 1024,
    };
    forwarder.handle_message(Command::Accepted as u32, &accepted.encode());

    let frame = recv_command(&mut rx).await;
    assert_eq!(frame.command, Command::Close);
    let close = CloseMsg::decode(&frame.payload).unwrap();
    assert_eq!(close.id, 42);
}

/// A duplicate connection id on `ACCEPTED` must close the prior connection
/// even when the second message's `listen_id` has no association — the
/// duplicate-id check must not be skipped just because the rest of the
/// message is otherwise rejected.
#[tokio::test]
async fn duplicate_accepted_id_with_unknown_association_closes_prior() {
    let (sink, mut rx) = mock_sink();
    let forwarder = Forwarder::new(sink);

    let target_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target_port = target_listener.local_addr().unwrap().port();

    assert!(forwarder.associate_remote(&format!("0.0.0.0:18830:127.0.0.1:{target_port}")));
    let listen_frame = recv_command(&mut rx).await;
    assert_eq!(listen_frame.command, Command::Listen);

    let first = AcceptedMsg {
        id: 42,
        listen_id: 18830,
        win_size: 2 * 1024 * 1024,
    };
    forwarder.handle_message(Command::Accepted as u32, &first.encode());

    let ack_frame = recv_command(&mut rx).await;
    assert_eq!(ack_frame.command, Command::Ack);

    let (mut target_side, _) = target_listener.accept().await.unwrap();

    let duplicate = AcceptedMsg {
        id: 42,
        listen_id: 9999,
        win_size: 1024,
    };
    forwarder.handle_message(Command::Accepted as u32, &duplicate.encode());

    let close_frame = recv_command(&mut rx).await;
    assert_eq!(close_frame.command, Command::Close);
    let close_msg = CloseMsg::decode(&close_frame.payload).unwrap();
    assert_eq!(close_msg.id, 42);

    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(2), target_side.read(&mut buf))
        .await
        .expect("timed out waiting for the stale connection's socket to close")
        .unwrap();
    assert_eq!(n, 0, "expected the prior connection's socket to be closed, not leaked");
}

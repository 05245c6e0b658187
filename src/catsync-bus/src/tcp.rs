// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! TCP bridge between processes.
//!
//! [`serve`] exposes a [`LocalBroker`] on a listener; [`connect`] opens a
//! session against a remote broker and keeps it alive across drops.

use std::time::Duration;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, info, warn};

use crate::broker::LocalBroker;
use crate::frame::{read_frame, write_frame, Frame};
use crate::message::{
    BusCommand, BusError, BusEvent, BusHandle, BusMessage, BusSession, ConnectOptions,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const IO_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Accept bridge connections until shutdown.
pub async fn serve(
    broker: LocalBroker,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!("Bus listening on {}", listener.local_addr()?);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                debug!("Bus peer connected from {}", peer);
                let broker = broker.clone();
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_peer(broker, stream, shutdown_rx).await {
                        warn!("Bus peer {} dropped: {}", peer, e);
                    }
                });
            }
            changed = shutdown_rx.changed() => {
                match changed {
                    Ok(()) if *shutdown_rx.borrow() => break,
                    Ok(()) => {}
                    Err(_) => break,
                }
            }
        }
    }
    info!("Bus listener shutting down");
    Ok(())
}

/// Forward frames from the socket into a channel so the read side can sit
/// in a `select!` without losing partial frames.
fn spawn_reader(mut reader: OwnedReadHalf) -> mpsc::Receiver<Result<Frame, BusError>> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        loop {
            let frame = read_frame(&mut reader).await;
            let failed = frame.is_err();
            if tx.send(frame).await.is_err() || failed {
                break;
            }
        }
    });
    rx
}

async fn handle_peer(
    broker: LocalBroker,
    stream: TcpStream,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), BusError> {
    let (reader, mut writer) = stream.into_split();
    let mut frames = spawn_reader(reader);

    let opts = match time::timeout(IO_TIMEOUT, frames.recv()).await {
        Ok(Some(Ok(Frame::Connect { client_id, will }))) => ConnectOptions { client_id, will },
        Ok(Some(Ok(other))) => {
            return Err(BusError::Malformed(format!(
                "expected CONNECT, got frame type {}",
                other.kind()
            )))
        }
        Ok(Some(Err(e))) => return Err(e),
        Ok(None) => return Ok(()),
        Err(_) => return Err(BusError::Malformed("no CONNECT received".to_string())),
    };
    let client_id = opts.client_id.clone();
    let mut session = broker.connect(opts);
    write_frame(&mut writer, &Frame::ConnAck).await?;
    info!("Bus client '{}' attached", client_id);

    loop {
        tokio::select! {
            frame = frames.recv() => {
                match frame {
                    Some(Ok(Frame::Publish(msg))) => {
                        if let Err(e) = session.handle.publish(msg) {
                            warn!("Bus client '{}': {}", client_id, e);
                        }
                    }
                    Some(Ok(Frame::Subscribe(filter))) => session.handle.subscribe(filter).await?,
                    Some(Ok(Frame::Disconnect)) => {
                        session.handle.disconnect().await?;
                        info!("Bus client '{}' disconnected", client_id);
                        return Ok(());
                    }
                    Some(Ok(other)) => {
                        debug!("Ignoring frame type {} from '{}'", other.kind(), client_id);
                    }
                    // dropping the session fires the client's will
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                }
            }
            event = session.events.recv() => {
                match event {
                    Some(BusEvent::Message(msg)) => {
                        write_frame(&mut writer, &Frame::Publish(msg)).await?;
                    }
                    Some(_) => {}
                    None => return Ok(()),
                }
            }
            changed = shutdown_rx.changed() => {
                match changed {
                    Ok(()) if *shutdown_rx.borrow() => return Ok(()),
                    Ok(()) => {}
                    Err(_) => return Ok(()),
                }
            }
        }
    }
}

/// Open a session against a remote broker.
///
/// The returned session stays valid across connection drops: the bridge
/// reconnects with a doubling backoff, re-subscribes and reports
/// [`BusEvent::Connected`]/[`BusEvent::Disconnected`] on every transition.
/// Messages published while disconnected are dropped.
pub fn connect(addr: impl Into<String>, opts: ConnectOptions) -> BusSession {
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(1024);
    tokio::spawn(run_remote(addr.into(), opts, cmd_rx, event_tx));
    BusSession {
        handle: BusHandle::new(cmd_tx),
        events: event_rx,
    }
}

enum LinkEnd {
    /// The local side ended the session.
    Closed,
    Lost(BusError),
}

async fn run_remote(
    addr: String,
    opts: ConnectOptions,
    mut commands: mpsc::Receiver<BusCommand>,
    events: mpsc::Sender<BusEvent>,
) {
    let mut subscriptions: Vec<String> = Vec::new();
    let mut reconnect_delay = Duration::from_secs(1);

    loop {
        info!("Bus: connecting to {}", addr);
        match time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                match run_link(stream, &opts, &mut subscriptions, &mut commands, &events).await {
                    (_, LinkEnd::Closed) => {
                        info!("Bus session to {} closed", addr);
                        return;
                    }
                    (established, LinkEnd::Lost(e)) => {
                        warn!("Bus connection to {} dropped: {}", addr, e);
                        if established {
                            reconnect_delay = Duration::from_secs(1);
                            if events.send(BusEvent::Disconnected).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            Ok(Err(e)) => warn!("Bus connect to {} failed: {}", addr, e),
            Err(_) => warn!("Bus connect to {} timed out after {:?}", addr, CONNECT_TIMEOUT),
        }

        let sleep = time::sleep(reconnect_delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = commands.recv() => match cmd {
                    Some(BusCommand::Subscribe(filter)) => remember(&mut subscriptions, filter),
                    Some(BusCommand::Publish(msg)) => {
                        debug!("Bus offline, dropping message on {}", msg.topic);
                    }
                    Some(BusCommand::Disconnect) | None => return,
                },
            }
        }
        reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
    }
}

fn remember(subscriptions: &mut Vec<String>, filter: String) {
    if !subscriptions.contains(&filter) {
        subscriptions.push(filter);
    }
}

/// Drive one TCP connection. Returns whether the handshake completed.
async fn run_link(
    stream: TcpStream,
    opts: &ConnectOptions,
    subscriptions: &mut Vec<String>,
    commands: &mut mpsc::Receiver<BusCommand>,
    events: &mpsc::Sender<BusEvent>,
) -> (bool, LinkEnd) {
    let (reader, mut writer) = stream.into_split();
    let mut frames = spawn_reader(reader);

    let hello = Frame::Connect {
        client_id: opts.client_id.clone(),
        will: opts.will.clone(),
    };
    if let Err(e) = write_frame(&mut writer, &hello).await {
        return (false, LinkEnd::Lost(e));
    }
    match time::timeout(IO_TIMEOUT, frames.recv()).await {
        Ok(Some(Ok(Frame::ConnAck))) => {}
        Ok(Some(Err(e))) => return (false, LinkEnd::Lost(e)),
        Ok(_) => {
            let e = BusError::Malformed("expected CONNACK".to_string());
            return (false, LinkEnd::Lost(e));
        }
        Err(_) => {
            let e = BusError::Malformed("no CONNACK received".to_string());
            return (false, LinkEnd::Lost(e));
        }
    }
    for filter in subscriptions.iter() {
        let frame = Frame::Subscribe(filter.clone());
        if let Err(e) = write_frame(&mut writer, &frame).await {
            return (true, LinkEnd::Lost(e));
        }
    }
    if events.send(BusEvent::Connected).await.is_err() {
        return (true, LinkEnd::Closed);
    }

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                let result = match cmd {
                    Some(BusCommand::Publish(msg)) => write_frame(&mut writer, &Frame::Publish(msg)).await,
                    Some(BusCommand::Subscribe(filter)) => {
                        remember(subscriptions, filter.clone());
                        write_frame(&mut writer, &Frame::Subscribe(filter)).await
                    }
                    Some(BusCommand::Disconnect) => {
                        let _ = write_frame(&mut writer, &Frame::Disconnect).await;
                        return (true, LinkEnd::Closed);
                    }
                    // all handles dropped without disconnect: let the will fire
                    None => return (true, LinkEnd::Closed),
                };
                if let Err(e) = result {
                    return (true, LinkEnd::Lost(e));
                }
            }
            frame = frames.recv() => {
                match frame {
                    Some(Ok(Frame::Publish(msg))) => {
                        if events.send(BusEvent::Message(msg)).await.is_err() {
                            return (true, LinkEnd::Closed);
                        }
                    }
                    Some(Ok(other)) => debug!("Ignoring frame type {} from broker", other.kind()),
                    Some(Err(e)) => return (true, LinkEnd::Lost(e)),
                    None => {
                        let e = BusError::Io(std::io::ErrorKind::UnexpectedEof.into());
                        return (true, LinkEnd::Lost(e));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_on(session: &mut BusSession, topic: &str) -> BusMessage {
        loop {
            match time::timeout(Duration::from_secs(5), session.events.recv())
                .await
                .expect("event timeout")
                .expect("events closed")
            {
                BusEvent::Message(msg) if msg.topic == topic => return msg,
                _ => continue,
            }
        }
    }

    async fn wait_connected(session: &mut BusSession) {
        loop {
            let event = time::timeout(Duration::from_secs(5), session.events.recv())
                .await
                .expect("event timeout")
                .expect("events closed");
            if event == BusEvent::Connected {
                return;
            }
        }
    }

    #[tokio::test]
    #[ignore = "requires TCP bind permissions"]
    async fn test_bridge_round_trip_and_will() {
        let broker = LocalBroker::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(serve(broker.clone(), listener, shutdown_rx));

        let mut local = broker.connect(ConnectOptions::new("local"));
        local.handle.subscribe("st/#").await.unwrap();

        let mut remote = connect(
            addr,
            ConnectOptions::new("remote")
                .with_will(BusMessage::new("st/status", "offline").retained()),
        );
        wait_connected(&mut remote).await;
        remote.handle.subscribe("st/cmd").await.unwrap();
        time::sleep(Duration::from_millis(50)).await;

        remote
            .handle
            .publish(BusMessage::new("st/state", "hello").retained())
            .unwrap();
        let msg = next_on(&mut local, "st/state").await;
        assert_eq!(&msg.payload[..], b"hello");

        local.handle.publish(BusMessage::new("st/cmd", "go")).unwrap();
        let msg = next_on(&mut remote, "st/cmd").await;
        assert_eq!(&msg.payload[..], b"go");

        drop(remote);
        let msg = next_on(&mut local, "st/status").await;
        assert_eq!(&msg.payload[..], b"offline");
    }
}

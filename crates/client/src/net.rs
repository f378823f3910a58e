//! Line-oriented relay link feeding [`MultiplayerState`].
//!
//! Inbound, one message per line: `connected`, `room <id>`,
//! `roster <a,b,...>`, `left`, `disconnected`. Outbound: `join`, `leave`.
//! The socket is non-blocking and polled once per turn. EOF or a read error
//! counts as a disconnect.

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::rc::Rc;

use dungeon_engine::{run_off_thread, TurnQueue};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::state::MultiplayerState;

const READ_CHUNK_BYTES: usize = 4096;
const MAX_PENDING_WRITE_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RelayMessage {
    Connected,
    Room(String),
    Roster(Vec<String>),
    Left,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outbound {
    Join,
    Leave,
}

impl Outbound {
    fn line(self) -> &'static str {
        match self {
            Outbound::Join => "join",
            Outbound::Leave => "leave",
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum TransportError {
    #[error("relay connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("relay io failed: {0}")]
    Io(#[from] io::Error),
    #[error("relay closed the connection")]
    Closed,
    #[error("malformed relay line '{line}': {message}")]
    Protocol { line: String, message: &'static str },
}

pub(crate) fn parse_relay_line(line: &str) -> Result<RelayMessage, TransportError> {
    let trimmed = line.trim();
    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };
    let protocol_error = |message| TransportError::Protocol {
        line: line.to_string(),
        message,
    };

    match command {
        "connected" if rest.is_empty() => Ok(RelayMessage::Connected),
        "left" if rest.is_empty() => Ok(RelayMessage::Left),
        "disconnected" if rest.is_empty() => Ok(RelayMessage::Disconnected),
        "room" => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                return Err(protocol_error("room id must be one non-empty token"));
            }
            Ok(RelayMessage::Room(rest.to_string()))
        }
        "roster" => Ok(RelayMessage::Roster(
            rest.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(ToString::to_string)
                .collect(),
        )),
        "connected" | "left" | "disconnected" => Err(protocol_error("unexpected arguments")),
        _ => Err(protocol_error("unknown command")),
    }
}

/// Applies one relay message. The room is only touched while connected.
pub(crate) fn apply_relay_message(multiplayer: &MultiplayerState, message: RelayMessage) {
    match message {
        RelayMessage::Connected => {
            if !multiplayer.is_connected() {
                multiplayer.connect(None);
            }
        }
        RelayMessage::Room(room) => {
            if multiplayer.is_connected() {
                multiplayer.join_room(room);
            } else {
                multiplayer.connect(Some(room));
            }
        }
        RelayMessage::Roster(players) => {
            multiplayer.update_roster(players);
        }
        RelayMessage::Left => {
            multiplayer.leave_room();
        }
        RelayMessage::Disconnected => {
            multiplayer.disconnect();
        }
    }
}

/// Outbound requests queued by scenes and flushed by the screen each turn.
#[derive(Debug, Clone, Default)]
pub(crate) struct Outbox {
    queued: Rc<RefCell<Vec<Outbound>>>,
}

impl Outbox {
    pub(crate) fn push(&self, request: Outbound) {
        self.queued.borrow_mut().push(request);
    }

    pub(crate) fn take(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.queued.borrow_mut())
    }
}

struct OpenLink {
    stream: TcpStream,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

enum LinkState {
    Connecting(TurnQueue<Result<TcpStream, TransportError>>),
    Open(OpenLink),
    Closed,
}

pub(crate) struct RelayLink {
    addr: String,
    state: LinkState,
}

impl std::fmt::Debug for RelayLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            LinkState::Connecting(_) => "connecting",
            LinkState::Open(_) => "open",
            LinkState::Closed => "closed",
        };
        f.debug_struct("RelayLink")
            .field("addr", &self.addr)
            .field("state", &state)
            .finish()
    }
}

impl RelayLink {
    /// Starts connecting on a worker thread.
    pub(crate) fn connect(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let results = TurnQueue::new();
        let target = addr.clone();
        let spawned = run_off_thread("relay-connect", results.sender(), move || {
            TcpStream::connect(target.as_str()).map_err(|source| TransportError::Connect {
                addr: target.clone(),
                source,
            })
        });
        let state = match spawned {
            Ok(()) => {
                info!(addr = %addr, "relay_connecting");
                LinkState::Connecting(results)
            }
            Err(error) => {
                warn!(addr = %addr, error = %error, "relay_connect_spawn_failed");
                LinkState::Closed
            }
        };
        Self { addr, state }
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self.state, LinkState::Closed)
    }

    /// Queues a request. Dropped unless the link is open.
    pub(crate) fn send(&mut self, request: Outbound) {
        let LinkState::Open(link) = &mut self.state else {
            debug!(request = ?request, "relay_request_dropped_not_open");
            return;
        };
        if link.write_buf.len() + request.line().len() + 1 > MAX_PENDING_WRITE_BYTES {
            warn!(request = ?request, "relay_write_buffer_full");
            return;
        }
        link.write_buf.extend_from_slice(request.line().as_bytes());
        link.write_buf.push(b'\n');
    }

    /// Moves the link forward without blocking and applies whatever arrived.
    pub(crate) fn poll(&mut self, multiplayer: &MultiplayerState) {
        if let LinkState::Connecting(results) = &self.state {
            let Some(result) = results.drain().pop() else {
                return;
            };
            match result.and_then(|stream| {
                stream.set_nonblocking(true)?;
                Ok(stream)
            }) {
                Ok(stream) => {
                    info!(addr = %self.addr, "relay_link_open");
                    self.state = LinkState::Open(OpenLink {
                        stream,
                        read_buf: Vec::new(),
                        write_buf: Vec::new(),
                    });
                }
                Err(error) => {
                    warn!(error = %error, "relay_connect_failed");
                    self.state = LinkState::Closed;
                    return;
                }
            }
        }

        let LinkState::Open(link) = &mut self.state else {
            return;
        };
        let mut lines = Vec::new();
        let read_result = read_available(link, &mut lines);
        let write_result = flush_pending(link);

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            match parse_relay_line(&line) {
                Ok(message) => apply_relay_message(multiplayer, message),
                Err(error) => warn!(error = %error, "relay_line_ignored"),
            }
        }

        if let Err(error) = read_result.and(write_result) {
            warn!(addr = %self.addr, error = %error, "relay_link_closed");
            self.state = LinkState::Closed;
            multiplayer.disconnect();
        }
    }
}

fn read_available(link: &mut OpenLink, out: &mut Vec<String>) -> Result<(), TransportError> {
    let mut chunk = [0u8; READ_CHUNK_BYTES];
    loop {
        match link.stream.read(&mut chunk) {
            Ok(0) => {
                drain_complete_lines(&mut link.read_buf, out);
                return Err(TransportError::Closed);
            }
            Ok(read) => {
                link.read_buf.extend_from_slice(&chunk[..read]);
                drain_complete_lines(&mut link.read_buf, out);
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(TransportError::Io(error)),
        }
    }
}

fn flush_pending(link: &mut OpenLink) -> Result<(), TransportError> {
    while !link.write_buf.is_empty() {
        match link.stream.write(&link.write_buf) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(written) => {
                link.write_buf.drain(..written);
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(TransportError::Io(error)),
        }
    }
    Ok(())
}

fn drain_complete_lines(buffer: &mut Vec<u8>, out: &mut Vec<String>) {
    while let Some(newline_index) = buffer.iter().position(|byte| *byte == b'\n') {
        let mut line_bytes = buffer.drain(..=newline_index).collect::<Vec<u8>>();
        line_bytes.pop();
        if line_bytes.last().copied() == Some(b'\r') {
            line_bytes.pop();
        }

        match String::from_utf8(line_bytes) {
            Ok(line) => out.push(line),
            Err(error) => warn!(error = %error, "relay_invalid_utf8_line_dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufRead;
    use std::io::BufReader;
    use std::net::TcpListener;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::state::Connection;

    fn poll_until(
        link: &mut RelayLink,
        multiplayer: &MultiplayerState,
        mut done: impl FnMut(&RelayLink, &MultiplayerState) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(link, multiplayer) {
            assert!(Instant::now() < deadline, "relay never reached expected state");
            link.poll(multiplayer);
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn parses_every_inbound_message() {
        assert_eq!(
            parse_relay_line("connected").expect("connected"),
            RelayMessage::Connected
        );
        assert_eq!(
            parse_relay_line("room crypt-7").expect("room"),
            RelayMessage::Room("crypt-7".to_string())
        );
        assert_eq!(
            parse_relay_line("roster ada, bo,,cy").expect("roster"),
            RelayMessage::Roster(vec!["ada".to_string(), "bo".to_string(), "cy".to_string()])
        );
        assert_eq!(
            parse_relay_line("roster").expect("empty roster"),
            RelayMessage::Roster(Vec::new())
        );
        assert_eq!(parse_relay_line("left").expect("left"), RelayMessage::Left);
        assert_eq!(
            parse_relay_line(" disconnected ").expect("disconnected"),
            RelayMessage::Disconnected
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        for line in ["", "room", "room a b", "connected now", "teleport 3"] {
            assert!(
                matches!(parse_relay_line(line), Err(TransportError::Protocol { .. })),
                "{line:?} should be rejected"
            );
        }
    }

    #[test]
    fn drain_splits_on_newlines_and_keeps_partial_tail() {
        let mut buffer = b"connected\r\nroom r1\nros".to_vec();
        let mut lines = Vec::new();
        drain_complete_lines(&mut buffer, &mut lines);
        assert_eq!(lines, vec!["connected".to_string(), "room r1".to_string()]);
        assert_eq!(buffer, b"ros".to_vec());
    }

    #[test]
    fn roster_before_room_is_ignored() {
        let multiplayer = MultiplayerState::new();
        apply_relay_message(&multiplayer, RelayMessage::Connected);
        apply_relay_message(&multiplayer, RelayMessage::Roster(vec!["a".to_string()]));
        assert!(multiplayer.roster.get().is_empty());

        apply_relay_message(&multiplayer, RelayMessage::Room("r1".to_string()));
        apply_relay_message(&multiplayer, RelayMessage::Roster(vec!["a".to_string()]));
        assert_eq!(multiplayer.roster.get(), vec!["a".to_string()]);
    }

    #[test]
    fn loopback_relay_drives_multiplayer_state() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            stream
                .write_all(b"connected\nroom crypt-7\nroster ada,bo\n")
                .expect("write greeting");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut request = String::new();
            reader.read_line(&mut request).expect("read request");
            request
        });

        let multiplayer = MultiplayerState::new();
        let mut link = RelayLink::connect(addr.to_string());
        poll_until(&mut link, &multiplayer, |_, state| state.roster.get().len() == 2);
        assert_eq!(
            multiplayer.connection.get(),
            Connection::Connected {
                room: Some("crypt-7".to_string())
            }
        );
        assert!(!link.is_closed());

        link.send(Outbound::Leave);
        link.poll(&multiplayer);
        let request = server.join().expect("server thread");
        assert_eq!(request.trim_end(), "leave");

        poll_until(&mut link, &multiplayer, |link, _| link.is_closed());
        assert!(!multiplayer.is_connected());
        assert_eq!(multiplayer.current_room(), None);
    }

    #[test]
    fn refused_connection_closes_without_connecting() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let multiplayer = MultiplayerState::new();
        let mut link = RelayLink::connect(addr.to_string());
        poll_until(&mut link, &multiplayer, |link, _| link.is_closed());
        assert!(!multiplayer.is_connected());
    }
}

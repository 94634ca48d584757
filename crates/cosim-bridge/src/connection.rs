//! Socket connection management.
//!
//! One listening Unix socket, one peer served at a time. A peer's
//! lifetime is a *generation*: the accept thread numbers each accepted
//! connection and hands stream clones to the send and receive threads
//! over channels; each loop hands the generation back when it gives up on
//! it. The next peer is accepted only after both loops have relinquished
//! the previous generation, so exactly one generation is ever active and
//! sender and receiver can detect a dead peer independently without
//! sharing a lock across socket I/O.
//!
//! Every socket fault — read/write error, EOF, out-of-range frame length,
//! undecodable frame — collapses to "generation aborted". The accept
//! thread then serves the next peer; nothing here is fatal to the
//! process.

use std::fs;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, trace};

use cosim_common::logging::{self, Severity};
use cosim_wire::{Message, CTRL_CHANNEL, MAX_FRAME_LEN, MIN_FRAME_LEN};

use crate::queue::MessageQueue;

/// Scope tag for connection log lines.
const SCOPE: &str = "connection";

/// How long the accept thread sleeps before retrying a failed bind.
const BIND_RETRY: Duration = Duration::from_secs(10);

/// Poll slice of the send loop's queue wait, so draining and a dead
/// generation are noticed even without outbound traffic.
const SEND_POLL: Duration = Duration::from_millis(100);

/// Which loop is reporting back to the accept thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Send,
    Recv,
}

/// One accepted peer connection, handed from the accept thread to a loop.
struct Generation {
    id: u64,
    stream: UnixStream,
}

/// A loop's notice that it has given up on a generation.
struct Relinquish {
    id: u64,
    role: Role,
}

/// State shared by the three connection threads.
struct Shared {
    running: AtomicBool,
    draining: AtomicBool,
    /// Highest generation id known dead. A loop blocked on the send
    /// queue rather than on socket I/O observes peer death through this.
    aborted: AtomicU64,
}

impl Shared {
    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn abort(&self, id: u64) {
        self.aborted.fetch_max(id, Ordering::SeqCst);
    }

    fn is_aborted(&self, id: u64) -> bool {
        self.aborted.load(Ordering::SeqCst) >= id
    }
}

/// Manages the socket connection to a peer: takes messages to send and
/// provides the messages it received.
pub struct Connection {
    send_queue: Arc<MessageQueue>,
    recv_queue: Arc<MessageQueue>,
    shared: Arc<Shared>,
}

impl Connection {
    /// Bind a listening socket at `path` and start the accept, send and
    /// receive threads. The threads run for the life of the process (or
    /// until draining completes) and recover from peer faults on their
    /// own.
    pub fn new(path: impl Into<PathBuf>) -> Connection {
        let path = path.into();
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            draining: AtomicBool::new(false),
            aborted: AtomicU64::new(0),
        });
        let send_queue = Arc::new(MessageQueue::new());
        let recv_queue = Arc::new(MessageQueue::new());

        let (send_gen_tx, send_gen_rx) = crossbeam_channel::unbounded();
        let (recv_gen_tx, recv_gen_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();

        {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("cosim-accept".into())
                .spawn(move || accept_loop(&path, &shared, &send_gen_tx, &recv_gen_tx, &done_rx))
                .expect("failed to spawn accept thread");
        }
        {
            let shared = Arc::clone(&shared);
            let queue = Arc::clone(&send_queue);
            let done = done_tx.clone();
            thread::Builder::new()
                .name("cosim-send".into())
                .spawn(move || send_loop(&shared, &queue, &send_gen_rx, &done))
                .expect("failed to spawn send thread");
        }
        {
            let shared = Arc::clone(&shared);
            let queue = Arc::clone(&recv_queue);
            thread::Builder::new()
                .name("cosim-recv".into())
                .spawn(move || recv_loop(&shared, &queue, &recv_gen_rx, &done_tx))
                .expect("failed to spawn receive thread");
        }

        Connection {
            send_queue,
            recv_queue,
            shared,
        }
    }

    /// Queue a message for transmission.
    pub fn push(&self, msg: Message) {
        self.send_queue.push(msg);
    }

    /// Wait until a received message is available or the timeout elapses.
    pub fn wait_received(&self, timeout: Duration) -> bool {
        self.recv_queue.wait(timeout)
    }

    /// Take the next received message, if any.
    pub fn try_pop_received(&self) -> Option<Message> {
        self.recv_queue.try_pop()
    }

    /// Enter draining mode: once the send queue is empty the send loop
    /// stops the whole connection manager.
    pub fn drain(&self) {
        self.shared.draining.store(true, Ordering::SeqCst);
    }

    /// Whether the connection manager is still serving peers.
    pub fn is_running(&self) -> bool {
        self.shared.running()
    }
}

fn bind_listener(path: &Path) -> io::Result<UnixListener> {
    // a socket file from a previous run would make bind fail
    let _ = fs::remove_file(path);
    UnixListener::bind(path)
}

fn accept_loop(
    path: &Path,
    shared: &Shared,
    to_send: &Sender<Generation>,
    to_recv: &Sender<Generation>,
    done: &Receiver<Relinquish>,
) {
    info!("start listening");
    let listener = loop {
        match bind_listener(path) {
            Ok(listener) => break listener,
            Err(err) => {
                error!("failed to listen on {}: {err}", path.display());
                info!("retrying listen in {} seconds", BIND_RETRY.as_secs());
                thread::sleep(BIND_RETRY);
                if !shared.running() {
                    return;
                }
            }
        }
    };
    info!("listening on {}", path.display());

    let mut generation = 0u64;
    while shared.running() {
        let stream = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(err) => {
                error!("cannot accept: {err}");
                continue;
            }
        };
        generation += 1;
        info!(generation, "new connection");

        let clones = stream.try_clone().and_then(|a| Ok((a, stream.try_clone()?)));
        let (send_stream, recv_stream) = match clones {
            Ok(pair) => pair,
            Err(err) => {
                error!("cannot clone peer socket: {err}");
                continue;
            }
        };
        let send_gen = Generation {
            id: generation,
            stream: send_stream,
        };
        let recv_gen = Generation {
            id: generation,
            stream: recv_stream,
        };
        if to_send.send(send_gen).is_err() || to_recv.send(recv_gen).is_err() {
            return;
        }

        // Serve this generation until both loops give it back. The first
        // relinquish kicks the other loop out of any blocking socket I/O.
        let mut send_done = false;
        let mut recv_done = false;
        while !(send_done && recv_done) {
            match done.recv() {
                Ok(rel) if rel.id == generation => {
                    match rel.role {
                        Role::Send => send_done = true,
                        Role::Recv => recv_done = true,
                    }
                    let _ = stream.shutdown(Shutdown::Both);
                }
                Ok(_) => {}
                Err(_) => return,
            }
        }
        debug!(generation, "connection closed");
    }
    let _ = fs::remove_file(path);
}

fn send_loop(
    shared: &Shared,
    queue: &MessageQueue,
    generations: &Receiver<Generation>,
    done: &Sender<Relinquish>,
) {
    while shared.running() {
        let Ok(generation) = generations.recv() else {
            return;
        };
        let mut stream = generation.stream;
        debug!(generation = generation.id, "send loop active");
        loop {
            if !shared.running() || shared.is_aborted(generation.id) {
                break;
            }
            if shared.draining.load(Ordering::SeqCst) && queue.is_empty() {
                info!("draining done");
                shared.running.store(false, Ordering::SeqCst);
                break;
            }
            if !queue.wait(SEND_POLL) {
                continue;
            }
            let Some(msg) = queue.try_pop() else {
                continue;
            };
            if let Err(err) = send_message(&mut stream, &msg) {
                error!("connection fault while sending: {err}");
                shared.abort(generation.id);
            }
        }
        let _ = done.send(Relinquish {
            id: generation.id,
            role: Role::Send,
        });
    }
}

fn send_message(stream: &mut UnixStream, msg: &Message) -> io::Result<()> {
    if msg.frame_len() > MAX_FRAME_LEN {
        error!(
            channel = msg.channel(),
            len = msg.frame_len(),
            "message unreasonably big - skip"
        );
        return Ok(());
    }
    if msg.channel() == CTRL_CHANNEL {
        if logging::enabled(SCOPE, Severity::Trace) {
            trace!(channel = msg.channel(), len = msg.frame_len(), "sending message");
        }
    } else if logging::enabled(SCOPE, Severity::Debug) {
        debug!(channel = msg.channel(), len = msg.frame_len(), "sending message");
    }

    let frame = msg.encode();
    let mut at = 0;
    while at < frame.len() {
        match stream.write(&frame[at..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => at += n,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn recv_loop(
    shared: &Shared,
    queue: &MessageQueue,
    generations: &Receiver<Generation>,
    done: &Sender<Relinquish>,
) {
    while shared.running() {
        let Ok(generation) = generations.recv() else {
            return;
        };
        let mut stream = generation.stream;
        debug!(generation = generation.id, "receive loop active");
        loop {
            match recv_message(&mut stream) {
                Ok(msg) => queue.push(msg),
                Err(err) => {
                    if err.kind() == io::ErrorKind::UnexpectedEof {
                        info!("EOF - connection closed");
                    } else {
                        error!("connection fault while receiving: {err}");
                    }
                    shared.abort(generation.id);
                }
            }
            if shared.is_aborted(generation.id) {
                break;
            }
        }
        let _ = done.send(Relinquish {
            id: generation.id,
            role: Role::Recv,
        });
    }
}

fn recv_message(stream: &mut UnixStream) -> io::Result<Message> {
    let mut head = [0u8; 4];
    stream.read_exact(&mut head)?;
    let frame_len = u32::from_be_bytes(head) as usize;
    if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&frame_len) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {frame_len} out of range"),
        ));
    }
    let mut frame = vec![0u8; frame_len];
    frame[..4].copy_from_slice(&head);
    stream.read_exact(&mut frame[4..])?;
    let msg = Message::decode(&frame)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    if logging::enabled(SCOPE, Severity::Trace) {
        trace!(channel = msg.channel(), len = frame_len, "received message");
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn connect(path: &Path) -> UnixStream {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match UnixStream::connect(path) {
                Ok(stream) => return stream,
                Err(_) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(10))
                }
                Err(err) => panic!("peer cannot connect: {err}"),
            }
        }
    }

    fn read_frame(stream: &mut UnixStream) -> io::Result<Message> {
        recv_message(stream)
    }

    #[test]
    fn test_send_and_receive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.sock");
        let conn = Connection::new(&path);

        let mut peer = connect(&path);
        conn.push(Message::new("data", vec![1, 2, 3, 4]));
        let out = read_frame(&mut peer).unwrap();
        assert_eq!(out.channel(), "data");
        assert_eq!(out.payload(), &[1, 2, 3, 4]);

        let inbound = Message::new("back", vec![9; 8]);
        peer.write_all(&inbound.encode()).unwrap();
        assert!(conn.wait_received(Duration::from_secs(5)));
        assert_eq!(conn.try_pop_received().unwrap(), inbound);
    }

    #[test]
    fn test_new_generation_after_peer_drops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.sock");
        let conn = Connection::new(&path);

        let peer = connect(&path);
        drop(peer);

        // a second peer is served once the first generation is torn down;
        // an inbound probe proves the new generation is active before we
        // send anything back out
        let mut peer = connect(&path);
        peer.write_all(&Message::new("probe", vec![7; 8]).encode())
            .unwrap();
        assert!(conn.wait_received(Duration::from_secs(5)));

        conn.push(Message::new("data", vec![5]));
        let out = read_frame(&mut peer).unwrap();
        assert_eq!(out.payload(), &[5]);
        assert!(conn.is_running());
    }

    #[test]
    fn test_bad_frame_length_aborts_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.sock");
        let conn = Connection::new(&path);

        let mut peer = connect(&path);
        // total length 15 is below the minimum and must kill this
        // generation only
        peer.write_all(&15u32.to_be_bytes()).unwrap();
        let mut sink = Vec::new();
        let _ = peer.read_to_end(&mut sink);

        let mut peer = connect(&path);
        peer.write_all(&Message::new("probe", vec![7; 8]).encode())
            .unwrap();
        assert!(conn.wait_received(Duration::from_secs(5)));

        conn.push(Message::new("data", vec![6]));
        assert_eq!(read_frame(&mut peer).unwrap().payload(), &[6]);
        assert!(conn.is_running());
    }

    #[test]
    fn test_oversized_send_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.sock");
        let conn = Connection::new(&path);

        let mut peer = connect(&path);
        conn.push(Message::new("big", vec![0; MAX_FRAME_LEN]));
        conn.push(Message::new("data", vec![8]));
        // only the in-range message arrives
        assert_eq!(read_frame(&mut peer).unwrap().payload(), &[8]);
    }

    #[test]
    fn test_drain_stops_manager() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.sock");
        let conn = Connection::new(&path);

        let mut peer = connect(&path);
        conn.push(Message::new("last", vec![1]));
        conn.drain();

        // the queued message still flushes, then the stream ends
        assert_eq!(read_frame(&mut peer).unwrap().payload(), &[1]);
        let mut rest = Vec::new();
        let _ = peer.read_to_end(&mut rest);
        assert!(rest.is_empty());

        let deadline = Instant::now() + Duration::from_secs(5);
        while conn.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!conn.is_running());
    }
}

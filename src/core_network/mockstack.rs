//! Scripted in-memory network stack for engine tests.
//!
//! Tests play the client: queue inbound connections and bytes through
//! the [`MockController`], run engine ticks, then inspect what the
//! engine transmitted.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use super::stack::{NetworkStack, Sd};

#[derive(Default)]
struct MockSock {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<u8>,
    peer_closed: bool,
    refuse_sends: u32,
    partial_send: Option<usize>,
}

#[derive(Default)]
struct MockInner {
    listeners: HashMap<Sd, u16>,
    pending: HashMap<u16, u32>,
    socks: HashMap<Sd, MockSock>,
    accepted: Vec<(u16, Sd)>,
    /// Bytes that were flushed to a socket before the engine closed it.
    closed_tx: HashMap<Sd, Vec<u8>>,
    next: u32,
}

impl MockInner {
    fn take_sd(&mut self) -> Sd {
        self.next += 1;
        Sd(self.next)
    }
}

pub struct MockStack {
    inner: Rc<RefCell<MockInner>>,
}

#[derive(Clone)]
pub struct MockController {
    inner: Rc<RefCell<MockInner>>,
}

impl MockStack {
    pub fn new() -> (MockStack, MockController) {
        let inner = Rc::new(RefCell::new(MockInner::default()));
        (
            MockStack {
                inner: Rc::clone(&inner),
            },
            MockController { inner },
        )
    }
}

impl MockController {
    /// Queues one inbound client connection on `port`; the engine picks
    /// it up at its next accept.
    pub fn connect(&self, port: u16) {
        *self.inner.borrow_mut().pending.entry(port).or_insert(0) += 1;
    }

    /// The most recently accepted connection on `port`.
    pub fn last_accepted(&self, port: u16) -> Option<Sd> {
        self.inner
            .borrow()
            .accepted
            .iter()
            .rev()
            .find(|(p, _)| *p == port)
            .map(|(_, sd)| *sd)
    }

    pub fn feed(&self, sd: Sd, data: &[u8]) {
        if let Some(sock) = self.inner.borrow_mut().socks.get_mut(&sd) {
            sock.rx.push_back(data.to_vec());
        }
    }

    /// Marks the peer side closed: pending bytes still drain, then
    /// reads see end-of-stream and writes fail.
    pub fn close_peer(&self, sd: Sd) {
        if let Some(sock) = self.inner.borrow_mut().socks.get_mut(&sd) {
            sock.peer_closed = true;
        }
    }

    /// Makes the next `count` sends on `sd` report would-block.
    pub fn refuse_sends(&self, sd: Sd, count: u32) {
        if let Some(sock) = self.inner.borrow_mut().socks.get_mut(&sd) {
            sock.refuse_sends = count;
        }
    }

    /// Makes the next send on `sd` accept only `count` bytes.
    pub fn partial_send(&self, sd: Sd, count: usize) {
        if let Some(sock) = self.inner.borrow_mut().socks.get_mut(&sd) {
            sock.partial_send = Some(count);
        }
    }

    pub fn take_tx(&self, sd: Sd) -> Vec<u8> {
        let mut inner = self.inner.borrow_mut();
        if let Some(sock) = inner.socks.get_mut(&sd) {
            return std::mem::take(&mut sock.tx);
        }
        inner.closed_tx.remove(&sd).unwrap_or_default()
    }

    pub fn take_tx_string(&self, sd: Sd) -> String {
        String::from_utf8_lossy(&self.take_tx(sd)).into_owned()
    }

    pub fn is_open(&self, sd: Sd) -> bool {
        self.inner.borrow().socks.contains_key(&sd)
    }

    pub fn listener_count(&self, port: u16) -> usize {
        self.inner
            .borrow()
            .listeners
            .values()
            .filter(|p| **p == port)
            .count()
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "peer gone")
}

impl NetworkStack for MockStack {
    fn listen(&mut self, port: u16, _backlog: u32) -> io::Result<Sd> {
        let mut inner = self.inner.borrow_mut();
        let sd = inner.take_sd();
        inner.listeners.insert(sd, port);
        Ok(sd)
    }

    fn accept(&mut self, listener: Sd) -> io::Result<Option<(Sd, SocketAddr)>> {
        let mut inner = self.inner.borrow_mut();
        let port = match inner.listeners.get(&listener) {
            Some(port) => *port,
            None => return Err(io::Error::new(io::ErrorKind::NotFound, "unknown socket")),
        };
        let waiting = inner.pending.get(&port).copied().unwrap_or(0);
        if waiting == 0 {
            return Ok(None);
        }
        inner.pending.insert(port, waiting - 1);
        let sd = inner.take_sd();
        inner.socks.insert(sd, MockSock::default());
        inner.accepted.push((port, sd));
        let addr: SocketAddr = "127.0.0.1:54321".parse().expect("literal addr");
        Ok(Some((sd, addr)))
    }

    fn recv(&mut self, sd: Sd, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let mut inner = self.inner.borrow_mut();
        let sock = match inner.socks.get_mut(&sd) {
            Some(sock) => sock,
            None => return Err(io::Error::new(io::ErrorKind::NotFound, "unknown socket")),
        };
        match sock.rx.pop_front() {
            Some(mut chunk) => {
                if chunk.len() > buf.len() {
                    let rest = chunk.split_off(buf.len());
                    sock.rx.push_front(rest);
                }
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(Some(chunk.len()))
            }
            None if sock.peer_closed => Ok(Some(0)),
            None => Ok(None),
        }
    }

    fn send(&mut self, sd: Sd, data: &[u8]) -> io::Result<Option<usize>> {
        let mut inner = self.inner.borrow_mut();
        let sock = match inner.socks.get_mut(&sd) {
            Some(sock) => sock,
            None => return Err(io::Error::new(io::ErrorKind::NotFound, "unknown socket")),
        };
        if sock.peer_closed {
            return Err(broken_pipe());
        }
        if sock.refuse_sends > 0 {
            sock.refuse_sends -= 1;
            return Ok(None);
        }
        let count = match sock.partial_send.take() {
            Some(limit) => limit.min(data.len()),
            None => data.len(),
        };
        sock.tx.extend_from_slice(&data[..count]);
        Ok(Some(count))
    }

    fn set_nonblocking(&mut self, _sd: Sd, _nonblocking: bool) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self, sd: Sd) {
        let mut inner = self.inner.borrow_mut();
        inner.listeners.remove(&sd);
        if let Some(sock) = inner.socks.remove(&sd) {
            if !sock.tx.is_empty() {
                inner.closed_tx.entry(sd).or_default().extend(sock.tx);
            }
        }
    }
}

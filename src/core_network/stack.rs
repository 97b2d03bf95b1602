//! Non-blocking socket operations behind a trait, so the engine can be
//! driven against the real network or a scripted stack in tests.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

/// Socket descriptor handed out by a network stack. Plain value; the
/// stack owns the underlying socket and closes it exactly once when
/// the descriptor is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sd(pub u32);

/// Non-blocking socket surface used by the engine.
///
/// "Would block" is surfaced as `Ok(None)`; a hard failure as `Err`.
/// `recv` returning `Ok(Some(0))` means the peer closed the
/// connection.
pub trait NetworkStack {
    fn listen(&mut self, port: u16, backlog: u32) -> io::Result<Sd>;
    fn accept(&mut self, listener: Sd) -> io::Result<Option<(Sd, SocketAddr)>>;
    fn recv(&mut self, sd: Sd, buf: &mut [u8]) -> io::Result<Option<usize>>;
    fn send(&mut self, sd: Sd, data: &[u8]) -> io::Result<Option<usize>>;
    fn set_nonblocking(&mut self, sd: Sd, nonblocking: bool) -> io::Result<()>;
    fn close(&mut self, sd: Sd);
}

/// Closes the socket held in `slot`, if any, and clears it.
pub fn close_socket(stack: &mut dyn NetworkStack, slot: &mut Option<Sd>) {
    if let Some(sd) = slot.take() {
        stack.close(sd);
    }
}

enum SysSocket {
    Listener(TcpListener),
    Stream(TcpStream),
}

/// The real stack, over `std::net` sockets in non-blocking mode.
pub struct SysNetworkStack {
    sockets: HashMap<Sd, SysSocket>,
    next: u32,
}

impl SysNetworkStack {
    pub fn new() -> Self {
        Self {
            sockets: HashMap::new(),
            next: 0,
        }
    }

    fn take_sd(&mut self) -> Sd {
        self.next = self.next.wrapping_add(1);
        Sd(self.next)
    }

    fn stream(&mut self, sd: Sd) -> io::Result<&mut TcpStream> {
        match self.sockets.get_mut(&sd) {
            Some(SysSocket::Stream(stream)) => Ok(stream),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, "unknown socket")),
        }
    }
}

impl Default for SysNetworkStack {
    fn default() -> Self {
        Self::new()
    }
}

fn would_block(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl NetworkStack for SysNetworkStack {
    fn listen(&mut self, port: u16, _backlog: u32) -> io::Result<Sd> {
        // std exposes no backlog knob; the platform default applies.
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        let sd = self.take_sd();
        self.sockets.insert(sd, SysSocket::Listener(listener));
        Ok(sd)
    }

    fn accept(&mut self, listener: Sd) -> io::Result<Option<(Sd, SocketAddr)>> {
        let accepted = match self.sockets.get_mut(&listener) {
            Some(SysSocket::Listener(sock)) => match sock.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(true)?;
                    Some((stream, addr))
                }
                Err(ref err) if would_block(err) => None,
                Err(err) => return Err(err),
            },
            _ => return Err(io::Error::new(io::ErrorKind::NotFound, "unknown socket")),
        };
        Ok(accepted.map(|(stream, addr)| {
            let sd = self.take_sd();
            self.sockets.insert(sd, SysSocket::Stream(stream));
            (sd, addr)
        }))
    }

    fn recv(&mut self, sd: Sd, buf: &mut [u8]) -> io::Result<Option<usize>> {
        use std::io::Read;
        match self.stream(sd)?.read(buf) {
            Ok(count) => Ok(Some(count)),
            Err(ref err) if would_block(err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn send(&mut self, sd: Sd, data: &[u8]) -> io::Result<Option<usize>> {
        use std::io::Write;
        match self.stream(sd)?.write(data) {
            Ok(count) => Ok(Some(count)),
            Err(ref err) if would_block(err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn set_nonblocking(&mut self, sd: Sd, nonblocking: bool) -> io::Result<()> {
        match self.sockets.get_mut(&sd) {
            Some(SysSocket::Listener(sock)) => sock.set_nonblocking(nonblocking),
            Some(SysSocket::Stream(sock)) => sock.set_nonblocking(nonblocking),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "unknown socket")),
        }
    }

    fn close(&mut self, sd: Sd) {
        self.sockets.remove(&sd);
    }
}

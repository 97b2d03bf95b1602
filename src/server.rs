//! The protocol engine.
//!
//! A strictly cooperative state machine: the external scheduler calls
//! [`FtpServer::tick`] once per cycle, each tick advances at most one
//! unit of work for the current state, then drains at most one reply
//! queue entry. Nothing here blocks, with one bounded exception in
//! [`FtpServer::send_from_queue`].

use std::net::Ipv4Addr;

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::constants::{FTP_CMD_BUFFER_SIZE, FTP_REPLY_QUEUE_DEPTH, FTP_TX_RETRIES_MAX};
use crate::core_ftpcommand::ftpcommand::{parse_command_line, FtpCommand};
use crate::core_ftpcommand::handlers::dispatch_command;
use crate::core_ftpcommand::{list, retr, stor};
use crate::core_network::replyqueue::{CloseOnDrain, ReplyEntry, ReplyQueue, ReplySocket};
use crate::core_network::stack::{close_socket, NetworkStack};
use crate::core_updater::Updater;
use crate::core_vfs::bridge::VfsBridge;
use crate::helpers;
use crate::session::{DataChannelState, OpenResource, Session, SessionState};

const GREETING: &str = "ferroftpd FTP server";

/// The engine. Owns the one session it serves; single-client capacity
/// is part of the design, not a limitation of the listener.
pub struct FtpServer {
    pub(crate) config: Config,
    pub(crate) stack: Box<dyn NetworkStack>,
    pub(crate) vfs: VfsBridge,
    pub(crate) updater: Box<dyn Updater>,
    pub(crate) session: Session,
    pub(crate) queue: ReplyQueue,
    pub(crate) pasv_ip: Ipv4Addr,
    pub(crate) enabled: bool,
}

impl FtpServer {
    pub fn new(
        config: Config,
        stack: Box<dyn NetworkStack>,
        vfs: VfsBridge,
        updater: Box<dyn Updater>,
    ) -> Self {
        let pasv_ip = config
            .server
            .pasv_address
            .parse()
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        Self {
            config,
            stack,
            vfs,
            updater,
            session: Session::new(),
            queue: ReplyQueue::new(FTP_REPLY_QUEUE_DEPTH),
            pasv_ip,
            enabled: false,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.reset();
        self.enabled = false;
        self.session.state = SessionState::Disabled;
    }

    /// Closes every socket, discards queued replies (releasing their
    /// payloads) and starts over from `Start`.
    pub fn reset(&mut self) {
        info!("resetting session");
        close_socket(self.stack.as_mut(), &mut self.session.cmd_listen_sd);
        close_socket(self.stack.as_mut(), &mut self.session.data_listen_sd);
        self.close_cmd_data();
        self.session.state = SessionState::Start;
        self.session.substate = DataChannelState::Disconnected;
        self.session.cursor = Default::default();
        self.queue.clear();
    }

    /// One cooperative step. Shared with sibling protocol engines, so
    /// the work done here is bounded by one buffer, never by a whole
    /// file or directory.
    pub fn tick(&mut self) {
        match self.session.state {
            SessionState::Disabled => {
                if self.enabled {
                    self.session.state = SessionState::Start;
                }
            }
            SessionState::Start => self.open_command_listener(),
            SessionState::Ready => self.step_ready(),
            SessionState::EndTransfer => {}
            SessionState::ContinueListing => list::continue_listing(self),
            SessionState::ContinueFileTx => retr::continue_file_tx(self),
            SessionState::ContinueFileRx => stor::continue_file_rx(self),
        }

        self.poll_data_channel();
        self.send_from_queue();

        // the single recovery path for transfers abandoned by the peer
        if self.session.data_sd.is_none() && self.session.in_transfer() {
            self.session.substate = DataChannelState::Disconnected;
            self.session.state = SessionState::Ready;
        }
    }

    fn open_command_listener(&mut self) {
        let port = self.config.server.cmd_port;
        match self.stack.listen(port, 0) {
            Ok(sd) => {
                info!("command channel listening on port {}", port);
                self.session.cmd_listen_sd = Some(sd);
                self.session.state = SessionState::Ready;
            }
            Err(err) => debug!("cannot listen on port {} yet: {}", port, err),
        }
    }

    fn step_ready(&mut self) {
        if self.session.cmd_sd.is_none() && self.session.substate == DataChannelState::Disconnected
        {
            let Some(listener) = self.session.cmd_listen_sd else {
                return;
            };
            match self.stack.accept(listener) {
                Ok(Some((sd, addr))) => {
                    info!("control connection from {}", addr);
                    self.session.cmd_sd = Some(sd);
                    self.session.start_connection();
                    self.send_reply(220, Some(GREETING));
                    return;
                }
                Ok(None) => {}
                Err(err) => {
                    error!("accept failed on the command listener: {}", err);
                    self.reset();
                    return;
                }
            }
        }
        if self.queue.is_empty()
            && self.session.cmd_sd.is_some()
            && self.session.substate != DataChannelState::ListenForData
        {
            self.process_cmd();
        }
    }

    /// Receives and dispatches at most one command line.
    fn process_cmd(&mut self) {
        let Some(sd) = self.session.cmd_sd else {
            return;
        };
        let mut buf = vec![0u8; FTP_CMD_BUFFER_SIZE];
        match self.stack.recv(sd, &mut buf) {
            Ok(Some(count)) if count > 0 => {
                self.session.ctimeout = 0;
                self.session.closechild = false;
                let line = String::from_utf8_lossy(&buf[..count]).into_owned();
                let (cmd, param) = parse_command_line(&line);
                debug!("command line: {:?}", line.trim_end());
                if !self.session.login.pass_ok
                    && !matches!(
                        cmd,
                        Some(FtpCommand::USER) | Some(FtpCommand::PASS) | Some(FtpCommand::QUIT)
                    )
                {
                    self.send_reply(332, None);
                    return;
                }
                dispatch_command(self, cmd, &param);
                if self.session.closechild {
                    helpers::return_to_previous_path(&mut self.session.cwd, &param);
                }
            }
            Ok(None) => {
                self.session.ctimeout += 1;
                if self.session.ctimeout > self.config.idle_limit_ticks() {
                    info!("command channel idle, saying goodbye");
                    self.session.ctimeout = 0;
                    self.send_reply(221, None);
                }
            }
            _ => {
                debug!("control connection lost");
                self.close_cmd_data();
            }
        }
    }

    /// Watches the data-channel axis: passive accepts, and the two
    /// data-side timeouts.
    fn poll_data_channel(&mut self) {
        match self.session.substate {
            DataChannelState::Disconnected => {}
            DataChannelState::ListenForData => {
                let Some(listener) = self.session.data_listen_sd else {
                    self.session.substate = DataChannelState::Disconnected;
                    return;
                };
                match self.stack.accept(listener) {
                    Ok(Some((sd, _addr))) => {
                        debug!("data connection accepted");
                        self.session.data_sd = Some(sd);
                        self.session.dtimeout = 0;
                        self.session.substate = DataChannelState::DataConnected;
                    }
                    Ok(None) => {
                        self.session.dtimeout += 1;
                        if self.session.dtimeout > self.config.data_limit_ticks() {
                            debug!("nobody connected to the passive listener, closing it");
                            self.session.dtimeout = 0;
                            close_socket(self.stack.as_mut(), &mut self.session.data_listen_sd);
                            self.session.substate = DataChannelState::Disconnected;
                        }
                    }
                    Err(err) => {
                        error!("accept failed on the data listener: {}", err);
                        self.reset();
                    }
                }
            }
            DataChannelState::DataConnected => {
                if self.session.state == SessionState::Ready {
                    self.session.dtimeout += 1;
                    if self.session.dtimeout > self.config.data_limit_ticks() {
                        debug!("idle data connection, dropping it");
                        close_socket(self.stack.as_mut(), &mut self.session.data_listen_sd);
                        close_socket(self.stack.as_mut(), &mut self.session.data_sd);
                        self.close_filesystem_on_error();
                        self.session.substate = DataChannelState::Disconnected;
                    }
                }
            }
        }
    }

    /// Drains at most one queue entry per tick.
    ///
    /// The target socket is flipped to blocking for the one send call
    /// and restored afterwards, bounding the worst-case stall to a
    /// single TCP write; anything short of a full flush is bounded by
    /// the retry counter.
    fn send_from_queue(&mut self) {
        if self.queue.is_empty() {
            // nothing queued: a finished transfer releases its data sockets
            if self.session.state == SessionState::EndTransfer && self.session.data_sd.is_some() {
                close_socket(self.stack.as_mut(), &mut self.session.data_listen_sd);
                close_socket(self.stack.as_mut(), &mut self.session.data_sd);
                self.session.special_transfer = false;
            }
            return;
        }

        let Some(target) = self.queue.front().map(|entry| entry.target) else {
            return;
        };
        let sd = match target {
            ReplySocket::Cmd => self.session.cmd_sd,
            ReplySocket::Data => self.session.data_sd,
        };
        let Some(sd) = sd else {
            // socket already gone: discard the entry, releasing the payload
            self.queue.pop_front();
            return;
        };

        let _ = self.stack.set_nonblocking(sd, false);
        let sent = match self.queue.front() {
            Some(entry) => self.stack.send(sd, entry.remaining()),
            None => return,
        };
        let _ = self.stack.set_nonblocking(sd, true);

        match sent {
            Ok(Some(count)) => {
                let flushed = match self.queue.front_mut() {
                    Some(entry) => {
                        entry.sent += count;
                        entry.is_flushed()
                    }
                    None => return,
                };
                if flushed {
                    self.session.tx_retries = 0;
                    if let Some(entry) = self.queue.pop_front() {
                        self.apply_close_action(entry.close);
                    }
                } else {
                    self.bump_tx_retries();
                }
            }
            Ok(None) => self.bump_tx_retries(),
            Err(err) => {
                error!("send failed, abandoning the session: {}", err);
                self.reset();
            }
        }
    }

    fn bump_tx_retries(&mut self) {
        self.session.tx_retries = self.session.tx_retries.saturating_add(1);
        if self.session.tx_retries > FTP_TX_RETRIES_MAX {
            warn!("transmit kept blocking, abandoning the session");
            self.reset();
        }
    }

    fn apply_close_action(&mut self, close: CloseOnDrain) {
        match close {
            CloseOnDrain::None => {}
            CloseOnDrain::Data => {
                close_socket(self.stack.as_mut(), &mut self.session.data_sd);
                self.close_filesystem_on_error();
            }
            CloseOnDrain::CmdAndData => {
                close_socket(self.stack.as_mut(), &mut self.session.data_sd);
                close_socket(self.stack.as_mut(), &mut self.session.data_listen_sd);
                close_socket(self.stack.as_mut(), &mut self.session.cmd_sd);
                self.session.substate = DataChannelState::Disconnected;
                self.close_filesystem_on_error();
            }
        }
    }

    /// Enqueues one `NNN text` reply for the command channel. Codes
    /// that end a transfer or the session carry the matching close
    /// side effect, executed only after the bytes are flushed.
    pub(crate) fn send_reply(&mut self, code: u16, message: Option<&str>) {
        let payload = format!("{} {}\r\n", code, message.unwrap_or("")).into_bytes();
        let close = match code {
            221 | 421 => CloseOnDrain::CmdAndData,
            426 | 451 | 550 => CloseOnDrain::Data,
            _ => CloseOnDrain::None,
        };
        self.push_entry(ReplyEntry::new(ReplySocket::Cmd, payload, close));
    }

    /// Enqueues one buffer for the data channel.
    pub(crate) fn send_data(&mut self, payload: Vec<u8>) {
        self.push_entry(ReplyEntry::new(
            ReplySocket::Data,
            payload,
            CloseOnDrain::None,
        ));
    }

    fn push_entry(&mut self, entry: ReplyEntry) {
        if let Err(dropped) = self.queue.push(entry) {
            // ownership came back: the payload is released right here
            warn!("reply queue full, dropping {} bytes", dropped.payload.len());
        }
    }

    /// Closes whichever filesystem resource is open, if any.
    pub(crate) fn close_files(&mut self) {
        match std::mem::take(&mut self.session.open_resource) {
            OpenResource::None => {}
            OpenResource::File(file) => {
                let _ = self.vfs.close(file);
            }
            OpenResource::Dir(dir) => self.vfs.closedir(dir),
        }
    }

    fn close_filesystem_on_error(&mut self) {
        self.close_files();
        if self.session.special_transfer {
            self.updater.finish();
            self.session.special_transfer = false;
        }
    }

    fn close_cmd_data(&mut self) {
        close_socket(self.stack.as_mut(), &mut self.session.cmd_sd);
        close_socket(self.stack.as_mut(), &mut self.session.data_sd);
        self.close_filesystem_on_error();
    }
}

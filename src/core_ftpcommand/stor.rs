use log::{debug, info, warn};

use crate::core_ftpcommand::utils::resolve_child;
use crate::core_vfs::backend::OpenMode;
use crate::server::FtpServer;
use crate::session::{OpenResource, SessionState};

/// Handles the STOR FTP command.
///
/// A store to the firmware-image path is handed to the updater, which
/// then owns the write path for the whole transfer; anything else is
/// created (truncating) through the filesystem bridge.
pub fn handle_stor_command(server: &mut FtpServer, arg: &str) {
    server.close_files();
    resolve_child(&mut server.session, arg);
    let path = server.session.cwd.clone();

    if server.updater.check_path(&path) {
        if server.updater.start() {
            info!("firmware upload started via {:?}", path);
            server.session.special_transfer = true;
            server.session.state = SessionState::ContinueFileRx;
            server.send_reply(150, None);
        } else {
            // release the updater lock
            server.updater.finish();
            server.session.state = SessionState::EndTransfer;
            server.send_reply(550, None);
        }
        return;
    }

    match server.vfs.open(&path, OpenMode::WriteCreate) {
        Ok(file) => {
            debug!("receiving {:?}", path);
            server.session.open_resource = OpenResource::File(file);
            server.session.state = SessionState::ContinueFileRx;
            server.send_reply(150, None);
        }
        Err(err) => {
            warn!("STOR {:?} failed: {}", path, err);
            server.session.state = SessionState::EndTransfer;
            server.send_reply(550, None);
        }
    }
}

/// One upload tick: receive at most one buffer from the data socket.
/// A closed or failing data socket ends the transfer; a quiet one is
/// bounded by the data-idle timeout.
pub fn continue_file_rx(server: &mut FtpServer) {
    if !server.queue.is_empty() {
        return;
    }
    let mut buf = vec![0u8; server.config.buffer_size()];
    let received = match server.session.data_sd {
        Some(sd) => server.stack.recv(sd, &mut buf),
        // no data socket at all reads as a finished stream
        None => Ok(Some(0)),
    };
    match received {
        Ok(Some(count)) if count > 0 => {
            server.session.dtimeout = 0;
            server.session.ctimeout = 0;
            let stored = if server.session.special_transfer {
                server.updater.write(&buf[..count])
            } else {
                write_file(server, &buf[..count])
            };
            if !stored {
                server.send_reply(451, None);
                server.session.state = SessionState::EndTransfer;
            }
        }
        Ok(None) => {
            server.session.dtimeout += 1;
            if server.session.dtimeout > server.config.data_limit_ticks() {
                warn!("data channel idle too long, aborting transfer");
                server.close_files();
                server.send_reply(426, None);
                server.session.state = SessionState::EndTransfer;
            }
        }
        _ => {
            if server.session.special_transfer {
                server.session.special_transfer = false;
                server.updater.finish();
            }
            server.close_files();
            server.send_reply(226, None);
            server.session.state = SessionState::EndTransfer;
        }
    }
}

/// Writes one received chunk through the bridge. A partial write fails
/// the transfer.
fn write_file(server: &mut FtpServer, data: &[u8]) -> bool {
    let FtpServer { session, vfs, .. } = server;
    let OpenResource::File(file) = &mut session.open_resource else {
        return false;
    };
    match vfs.write(file, data) {
        Ok(count) if count == data.len() => true,
        _ => {
            if let OpenResource::File(file) = std::mem::take(&mut session.open_resource) {
                let _ = vfs.close(file);
            }
            false
        }
    }
}

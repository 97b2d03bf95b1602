use log::{debug, warn};

use crate::core_ftpcommand::utils::resolve_child;
use crate::core_vfs::backend::OpenMode;
use crate::core_vfs::error::{VfsError, VfsResult};
use crate::server::FtpServer;
use crate::session::{OpenResource, SessionState};

/// Handles the RETR FTP command: open the target read-only and stream
/// it out one buffer per tick.
pub fn handle_retr_command(server: &mut FtpServer, arg: &str) {
    server.close_files();
    resolve_child(&mut server.session, arg);
    let path = server.session.cwd.clone();
    match server.vfs.open(&path, OpenMode::Read) {
        Ok(file) => {
            debug!("sending {:?}", path);
            server.session.open_resource = OpenResource::File(file);
            server.session.state = SessionState::ContinueFileTx;
            server.send_reply(150, None);
        }
        Err(err) => {
            warn!("RETR {:?} failed: {}", path, err);
            server.session.state = SessionState::EndTransfer;
            server.send_reply(550, None);
        }
    }
}

/// One download tick: read the next block only once the previous one
/// has left the queue.
pub fn continue_file_tx(server: &mut FtpServer) {
    if !server.queue.is_empty() {
        return;
    }
    server.session.ctimeout = 0;
    let mut buf = vec![0u8; server.config.buffer_size()];
    match read_file(server, &mut buf) {
        Err(_) => {
            server.send_reply(451, None);
            server.session.state = SessionState::EndTransfer;
        }
        Ok((count, end_of_file)) => {
            if count > 0 {
                buf.truncate(count);
                server.send_data(buf);
            }
            if end_of_file {
                server.send_reply(226, None);
                server.session.state = SessionState::EndTransfer;
            }
        }
    }
}

/// Reads up to one buffer from the open file. A short read signals
/// end-of-file; the file is closed on both completion and error.
fn read_file(server: &mut FtpServer, buf: &mut [u8]) -> VfsResult<(usize, bool)> {
    let FtpServer { session, vfs, .. } = server;
    let OpenResource::File(file) = &session.open_resource else {
        return Err(VfsError::InvalidHandle);
    };
    match vfs.read(file, buf) {
        Ok(count) if count < buf.len() => {
            if let OpenResource::File(file) = std::mem::take(&mut session.open_resource) {
                let _ = vfs.close(file);
            }
            Ok((count, true))
        }
        Ok(count) => Ok((count, false)),
        Err(err) => {
            if let OpenResource::File(file) = std::mem::take(&mut session.open_resource) {
                let _ = vfs.close(file);
            }
            Err(err)
        }
    }
}

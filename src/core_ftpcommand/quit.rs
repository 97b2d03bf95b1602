use log::info;

use crate::server::FtpServer;

/// Handles the QUIT FTP command. The goodbye reply carries the close
/// side effect, so both channels shut down only after it is flushed.
pub fn handle_quit_command(server: &mut FtpServer) {
    info!("client requested QUIT");
    server.send_reply(221, None);
}

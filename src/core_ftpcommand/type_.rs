use crate::server::FtpServer;

/// Both ASCII and IMAGE requests are acknowledged; transfers are
/// always binary-clean.
pub fn handle_type_command(server: &mut FtpServer, _arg: &str) {
    server.send_reply(200, None);
}

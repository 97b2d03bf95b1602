use log::debug;

use crate::core_ftpcommand::utils::secure_eq;
use crate::server::FtpServer;

/// Handles the USER FTP command.
///
/// The reply never reveals whether the name matched; the verdict only
/// shows after PASS.
pub fn handle_user_command(server: &mut FtpServer, arg: &str) {
    server.session.login.user_ok = secure_eq(arg, &server.config.server.username);
    debug!("USER received, awaiting password");
    server.send_reply(331, None);
}

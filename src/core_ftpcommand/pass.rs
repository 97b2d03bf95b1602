use log::{info, warn};

use crate::constants::FTP_LOGIN_RETRIES_MAX;
use crate::core_ftpcommand::utils::secure_eq;
use crate::server::FtpServer;

/// Handles the PASS FTP command.
///
/// Both the username and the password must have matched exactly.
/// Repeated failures close the control connection.
pub fn handle_pass_command(server: &mut FtpServer, arg: &str) {
    let password_ok = secure_eq(arg, &server.config.server.password);
    if server.session.login.user_ok && password_ok {
        server.session.login.pass_ok = true;
        server.session.login_retries = 0;
        info!("client logged in");
        server.send_reply(230, None);
        return;
    }

    server.session.login_retries = server.session.login_retries.saturating_add(1);
    if server.session.login_retries > FTP_LOGIN_RETRIES_MAX {
        warn!("too many failed login attempts, closing control connection");
        server.send_reply(421, None);
    } else {
        warn!("login failed (attempt {})", server.session.login_retries);
        server.send_reply(530, None);
    }
}

use crate::server::FtpServer;

/// Handles PWD and its obsolete alias XPWD.
pub fn handle_pwd_command(server: &mut FtpServer) {
    let cwd = server.session.cwd.clone();
    server.send_reply(257, Some(&cwd));
}

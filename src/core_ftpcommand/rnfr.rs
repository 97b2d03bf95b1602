use log::debug;

use crate::core_ftpcommand::utils::resolve_child;
use crate::server::FtpServer;

/// Handles the RNFR (Rename From) FTP command: the source must exist,
/// and its path is stashed for the RNTO that should follow.
pub fn handle_rnfr_command(server: &mut FtpServer, arg: &str) {
    resolve_child(&mut server.session, arg);
    let path = server.session.cwd.clone();
    match server.vfs.stat(&path) {
        Ok(_) => {
            debug!("rename source {:?}", path);
            server.session.rename_from = Some(path);
            server.send_reply(350, None);
        }
        Err(_) => server.send_reply(550, None),
    }
}

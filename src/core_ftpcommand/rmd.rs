use log::info;

use crate::core_ftpcommand::utils::resolve_child;
use crate::server::FtpServer;

/// Handles the RMD FTP command. Directory removal goes through the
/// same unlink operation as DELE; the bridge refuses non-empty
/// directories.
pub fn handle_rmd_command(server: &mut FtpServer, arg: &str) {
    resolve_child(&mut server.session, arg);
    let path = server.session.cwd.clone();
    match server.vfs.unlink(&path) {
        Ok(()) => {
            info!("removed directory {:?}", path);
            server.send_reply(250, None);
        }
        Err(_) => server.send_reply(550, None),
    }
}

use log::{info, warn};

use crate::core_ftpcommand::utils::resolve_child;
use crate::server::FtpServer;

/// Handles the RNTO (Rename To) FTP command. Both paths must resolve
/// to the same volume; the bridge rejects anything else.
pub fn handle_rnto_command(server: &mut FtpServer, arg: &str) {
    resolve_child(&mut server.session, arg);
    let to = server.session.cwd.clone();
    let Some(from) = server.session.rename_from.take() else {
        warn!("RNTO without a preceding RNFR");
        server.send_reply(550, None);
        return;
    };
    match server.vfs.rename(&from, &to) {
        Ok(()) => {
            info!("renamed {:?} -> {:?}", from, to);
            server.send_reply(250, None);
        }
        Err(_) => server.send_reply(550, None),
    }
}

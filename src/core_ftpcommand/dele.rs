use log::info;

use crate::core_ftpcommand::utils::resolve_child;
use crate::server::FtpServer;

pub fn handle_dele_command(server: &mut FtpServer, arg: &str) {
    resolve_child(&mut server.session, arg);
    let path = server.session.cwd.clone();
    match server.vfs.unlink(&path) {
        Ok(()) => {
            info!("deleted {:?}", path);
            server.send_reply(250, None);
        }
        Err(_) => server.send_reply(550, None),
    }
}

use log::debug;

use crate::helpers;
use crate::server::FtpServer;

/// Handles the CWD FTP command.
///
/// The new path must be the volume root or an openable directory;
/// otherwise the previous working directory is restored.
pub fn handle_cwd_command(server: &mut FtpServer, arg: &str) {
    helpers::open_child(&mut server.session.cwd, arg);
    let path = server.session.cwd.clone();

    if path == "/" {
        server.send_reply(250, None);
        return;
    }
    match server.vfs.opendir(&path) {
        Ok(dir) => {
            server.vfs.closedir(dir);
            debug!("working directory now {:?}", path);
            server.send_reply(250, None);
        }
        Err(err) => {
            debug!("CWD to {:?} failed: {}", path, err);
            helpers::close_child(&mut server.session.cwd);
            server.send_reply(550, None);
        }
    }
}

use crate::core_ftpcommand::utils::resolve_child;
use crate::server::FtpServer;

pub fn handle_size_command(server: &mut FtpServer, arg: &str) {
    resolve_child(&mut server.session, arg);
    let path = server.session.cwd.clone();
    match server.vfs.stat(&path) {
        Ok(meta) => {
            let size = meta.size.to_string();
            server.send_reply(213, Some(&size));
        }
        Err(_) => server.send_reply(550, None),
    }
}

use crate::core_ftpcommand::list::reference_mtime;
use crate::core_ftpcommand::utils::resolve_child;
use crate::server::FtpServer;

/// Handles the MDTM FTP command: last modification time as
/// `YYYYMMDDHHMMSS`. Entries without a recorded time report the fixed
/// reference date.
pub fn handle_mdtm_command(server: &mut FtpServer, arg: &str) {
    resolve_child(&mut server.session, arg);
    let path = server.session.cwd.clone();
    match server.vfs.stat(&path) {
        Ok(meta) => {
            let mtime = meta.mtime.unwrap_or_else(reference_mtime);
            let stamp = mtime.format("%Y%m%d%H%M%S").to_string();
            server.send_reply(213, Some(&stamp));
        }
        Err(_) => server.send_reply(550, None),
    }
}

use crate::helpers;
use crate::server::FtpServer;

pub fn handle_cdup_command(server: &mut FtpServer) {
    helpers::close_child(&mut server.session.cwd);
    server.send_reply(250, None);
}

use crate::server::FtpServer;

pub fn handle_noop_command(server: &mut FtpServer) {
    server.send_reply(200, None);
}

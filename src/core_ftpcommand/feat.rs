use crate::server::FtpServer;

pub fn handle_feat_command(server: &mut FtpServer) {
    server.send_reply(211, Some("no-features"));
}

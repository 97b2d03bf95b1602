use crate::server::FtpServer;

pub fn handle_syst_command(server: &mut FtpServer) {
    server.send_reply(215, Some("UNIX Type: L8"));
}

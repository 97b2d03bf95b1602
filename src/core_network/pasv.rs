use std::net::Ipv4Addr;

use log::{debug, error};

use crate::core_network::stack::close_socket;
use crate::server::FtpServer;
use crate::session::DataChannelState;

/// Formats the octet sextet carried by a 227 reply.
pub fn format_pasv_reply(addr: Ipv4Addr, port: u16) -> String {
    let [h1, h2, h3, h4] = addr.octets();
    format!(
        "({},{},{},{},{},{})",
        h1,
        h2,
        h3,
        h4,
        port >> 8,
        port & 0xff
    )
}

/// Handles the PASV FTP command.
///
/// Some clients (Chrome among them) issue PASV several times in quick
/// succession, so any previous data connection is dropped first and
/// the passive listener is reused when it already exists — at most one
/// ever stays open.
pub fn handle_pasv_command(server: &mut FtpServer) {
    close_socket(server.stack.as_mut(), &mut server.session.data_sd);
    server.session.substate = DataChannelState::Disconnected;

    let pasv_port = server.config.server.pasv_port;
    let mut listener_ready = true;
    if server.session.data_listen_sd.is_none() {
        match server.stack.listen(pasv_port, 0) {
            Ok(sd) => {
                debug!("passive listener open on port {}", pasv_port);
                server.session.data_listen_sd = Some(sd);
            }
            Err(err) => {
                error!("failed to open passive listener on port {}: {}", pasv_port, err);
                listener_ready = false;
            }
        }
    }

    if listener_ready {
        server.session.dtimeout = 0;
        server.session.substate = DataChannelState::ListenForData;
        let reply = format_pasv_reply(server.pasv_ip, pasv_port);
        server.send_reply(227, Some(&reply));
    } else {
        server.send_reply(425, None);
    }
}

use crate::core_ftpcommand::ftpcommand::FtpCommand;
use crate::core_network::pasv;
use crate::server::FtpServer;

/// Routes one parsed command to its handler. Every handler enqueues
/// exactly one reply; none of them touch a socket directly.
pub fn dispatch_command(server: &mut FtpServer, cmd: Option<FtpCommand>, arg: &str) {
    match cmd {
        Some(FtpCommand::FEAT) => crate::core_ftpcommand::feat::handle_feat_command(server),
        Some(FtpCommand::SYST) => crate::core_ftpcommand::syst::handle_syst_command(server),
        Some(FtpCommand::CDUP) => crate::core_ftpcommand::cdup::handle_cdup_command(server),
        Some(FtpCommand::CWD) => crate::core_ftpcommand::cwd::handle_cwd_command(server, arg),
        Some(FtpCommand::PWD) | Some(FtpCommand::XPWD) => {
            crate::core_ftpcommand::pwd::handle_pwd_command(server)
        }
        Some(FtpCommand::SIZE) => crate::core_ftpcommand::size::handle_size_command(server, arg),
        Some(FtpCommand::MDTM) => crate::core_ftpcommand::mdtm::handle_mdtm_command(server, arg),
        Some(FtpCommand::TYPE) => crate::core_ftpcommand::type_::handle_type_command(server, arg),
        Some(FtpCommand::USER) => crate::core_ftpcommand::user::handle_user_command(server, arg),
        Some(FtpCommand::PASS) => crate::core_ftpcommand::pass::handle_pass_command(server, arg),
        Some(FtpCommand::PASV) => pasv::handle_pasv_command(server),
        Some(FtpCommand::LIST) => crate::core_ftpcommand::list::handle_list_command(server),
        Some(FtpCommand::RETR) => crate::core_ftpcommand::retr::handle_retr_command(server, arg),
        Some(FtpCommand::STOR) => crate::core_ftpcommand::stor::handle_stor_command(server, arg),
        Some(FtpCommand::DELE) => crate::core_ftpcommand::dele::handle_dele_command(server, arg),
        Some(FtpCommand::RMD) => crate::core_ftpcommand::rmd::handle_rmd_command(server, arg),
        Some(FtpCommand::MKD) => crate::core_ftpcommand::mkd::handle_mkd_command(server, arg),
        Some(FtpCommand::RNFR) => crate::core_ftpcommand::rnfr::handle_rnfr_command(server, arg),
        Some(FtpCommand::RNTO) => crate::core_ftpcommand::rnto::handle_rnto_command(server, arg),
        Some(FtpCommand::NOOP) => crate::core_ftpcommand::noop::handle_noop_command(server),
        Some(FtpCommand::QUIT) => crate::core_ftpcommand::quit::handle_quit_command(server),
        None => {
            // command not implemented
            server.send_reply(502, None);
        }
    }
}

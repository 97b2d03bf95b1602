use crate::constants::FTP_CMD_SIZE_MAX;

#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
pub enum FtpCommand {
    FEAT,
    SYST,
    CDUP,
    CWD,
    PWD,
    XPWD,
    SIZE,
    MDTM,
    TYPE,
    USER,
    PASS,
    PASV,
    LIST,
    RETR,
    STOR,
    DELE,
    RMD,
    MKD,
    RNFR,
    RNTO,
    NOOP,
    QUIT,
}

impl FtpCommand {
    pub fn from_str(cmd: &str) -> Option<FtpCommand> {
        match cmd.to_ascii_uppercase().as_str() {
            "FEAT" => Some(FtpCommand::FEAT),
            "SYST" => Some(FtpCommand::SYST),
            "CDUP" => Some(FtpCommand::CDUP),
            "CWD" => Some(FtpCommand::CWD),
            "PWD" => Some(FtpCommand::PWD),
            "XPWD" => Some(FtpCommand::XPWD),
            "SIZE" => Some(FtpCommand::SIZE),
            "MDTM" => Some(FtpCommand::MDTM),
            "TYPE" => Some(FtpCommand::TYPE),
            "USER" => Some(FtpCommand::USER),
            "PASS" => Some(FtpCommand::PASS),
            "PASV" => Some(FtpCommand::PASV),
            "LIST" => Some(FtpCommand::LIST),
            "RETR" => Some(FtpCommand::RETR),
            "STOR" => Some(FtpCommand::STOR),
            "DELE" => Some(FtpCommand::DELE),
            "RMD" => Some(FtpCommand::RMD),
            "MKD" => Some(FtpCommand::MKD),
            "RNFR" => Some(FtpCommand::RNFR),
            "RNTO" => Some(FtpCommand::RNTO),
            "NOOP" => Some(FtpCommand::NOOP),
            "QUIT" => Some(FtpCommand::QUIT),
            _ => None,
        }
    }
}

/// Splits one received line into its verb and parameter.
///
/// The verb is the first whitespace-delimited token. The parameter is
/// everything after it up to the line terminator: paths and
/// credentials may legitimately contain spaces.
pub fn parse_command_line(line: &str) -> (Option<FtpCommand>, String) {
    let line = match line.find(['\r', '\n']) {
        Some(end) => &line[..end],
        None => line,
    };
    let mut parts = line.splitn(2, ' ');
    let verb = parts.next().unwrap_or("");
    let param = parts.next().unwrap_or("").trim().to_string();
    if verb.is_empty() || verb.len() > FTP_CMD_SIZE_MAX {
        return (None, param);
    }
    (FtpCommand::from_str(verb), param)
}

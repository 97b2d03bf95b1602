// src/constants.rs

pub const USERNAME_REGEX: &str = r"^[a-zA-Z0-9]{1,32}$";
pub const CREDENTIAL_MAX_LENGTH: usize = 32;

/// Default control-channel port.
pub const FTP_CMD_PORT: u16 = 21;
/// Default passive-mode data port.
pub const FTP_PASV_DATA_PORT: u16 = 2024;

/// One transfer buffer: the engine never moves more than this per tick.
pub const FTP_BUFFER_SIZE: usize = 512;
/// Longest accepted command verb, in bytes.
pub const FTP_CMD_SIZE_MAX: usize = 6;
/// Longest accepted path or credential parameter, in bytes.
pub const FTP_MAX_PARAM_SIZE: usize = 129;
/// Receive buffer for one command line.
pub const FTP_CMD_BUFFER_SIZE: usize = FTP_MAX_PARAM_SIZE + FTP_CMD_SIZE_MAX;

/// Outbound sends kept alive across ticks before the session is
/// declared broken.
pub const FTP_TX_RETRIES_MAX: u8 = 25;
/// Failed PASS attempts tolerated before the control channel is closed.
pub const FTP_LOGIN_RETRIES_MAX: u8 = 3;

/// Directory entries read per listing tick.
pub const FTP_LIST_ENTRIES_PER_TICK: usize = 8;
/// Reply queue depth.
pub const FTP_REPLY_QUEUE_DEPTH: usize = 4;

pub const FTP_DATA_TIMEOUT_MS: u32 = 5_000;
pub const FTP_CMD_TIMEOUT_MS: u32 = 300_000;
pub const FTP_CYCLE_TIME_MS: u32 = 80;

/// Listing entries older than this are shown with a year instead of HH:MM.
pub const SECONDS_180_DAYS: i64 = 15_552_000;

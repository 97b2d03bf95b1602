use crate::core_network::stack::Sd;
use crate::core_vfs::bridge::{DirRef, FileRef};

/// Primary engine state. One unit of work happens per tick in whichever
/// state the session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disabled,
    Start,
    Ready,
    EndTransfer,
    ContinueListing,
    ContinueFileTx,
    ContinueFileRx,
}

/// Data-channel state, independent of the primary state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    Disconnected,
    ListenForData,
    DataConnected,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Login {
    pub user_ok: bool,
    pub pass_ok: bool,
}

/// At most one filesystem resource is open at any time.
#[derive(Debug, Default)]
pub enum OpenResource {
    #[default]
    None,
    File(FileRef),
    Dir(DirRef),
}

/// Where a directory listing stands, persisted across ticks so an
/// interrupted listing resumes where it left off.
#[derive(Debug, Default)]
pub struct ListingCursor {
    /// Listing the synthetic volume-root directory rather than a real
    /// one.
    pub root: bool,
    pub volume_index: u32,
    /// Entries consumed from the directory so far, dot entries
    /// included.
    pub last_emitted_index: u32,
    /// A forced reopen happened; the next tick must replay
    /// `last_emitted_index` entries before emitting (the backends
    /// cannot seek).
    pub replay_pending: bool,
    pub dir_path: String,
}

/// The one client the engine serves. Created once and reset in place;
/// single-connection capacity is by construction, not accident.
#[derive(Debug)]
pub struct Session {
    pub state: SessionState,
    pub substate: DataChannelState,

    pub cmd_listen_sd: Option<Sd>,
    pub cmd_sd: Option<Sd>,
    pub data_listen_sd: Option<Sd>,
    pub data_sd: Option<Sd>,

    pub login: Login,
    pub cwd: String,
    pub open_resource: OpenResource,
    /// The current STOR feeds the firmware updater instead of the
    /// filesystem bridge.
    pub special_transfer: bool,
    pub cursor: ListingCursor,

    /// Idle/retry counters, all in scheduler ticks.
    pub ctimeout: u32,
    pub dtimeout: u32,
    pub tx_retries: u8,
    pub login_retries: u8,

    /// Source path stashed between RNFR and RNTO.
    pub rename_from: Option<String>,
    /// The last command transiently resolved a child path; restore the
    /// working directory after dispatch.
    pub closechild: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disabled,
            substate: DataChannelState::Disconnected,
            cmd_listen_sd: None,
            cmd_sd: None,
            data_listen_sd: None,
            data_sd: None,
            login: Login::default(),
            cwd: String::from("/"),
            open_resource: OpenResource::None,
            special_transfer: false,
            cursor: ListingCursor::default(),
            ctimeout: 0,
            dtimeout: 0,
            tx_retries: 0,
            login_retries: 0,
            rename_from: None,
            closechild: false,
        }
    }

    /// Per-connection state, cleared when a new control client is
    /// accepted.
    pub fn start_connection(&mut self) {
        self.tx_retries = 0;
        self.login_retries = 0;
        self.ctimeout = 0;
        self.login = Login::default();
        self.cwd.clear();
        self.cwd.push('/');
        self.rename_from = None;
    }

    /// True in any state past `Ready`, i.e. the session was mid-transfer.
    pub fn in_transfer(&self) -> bool {
        matches!(
            self.state,
            SessionState::EndTransfer
                | SessionState::ContinueListing
                | SessionState::ContinueFileTx
                | SessionState::ContinueFileRx
        )
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

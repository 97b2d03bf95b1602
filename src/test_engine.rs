// Scripted end-to-end tests: the mock stack plays the client, the
// engine is driven tick by tick.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Config;
use crate::core_network::mockstack::{MockController, MockStack};
use crate::core_network::stack::Sd;
use crate::core_updater::Updater;
use crate::core_vfs::backend::{Backend, OpenMode};
use crate::core_vfs::bridge::VfsBridge;
use crate::core_vfs::error::VfsError;
use crate::core_vfs::flashfs::FlashFs;
use crate::core_vfs::sdfat::SdFatFs;
use crate::server::FtpServer;
use crate::session::{OpenResource, SessionState};

#[derive(Default)]
struct ProbeState {
    started: u32,
    finished: u32,
    bytes: Vec<u8>,
    refuse_start: bool,
}

/// Updater test double recording every call.
struct UpdaterProbe(Rc<RefCell<ProbeState>>);

impl Updater for UpdaterProbe {
    fn check_path(&self, path: &str) -> bool {
        path == "/flash/sys/appimg.bin"
    }

    fn start(&mut self) -> bool {
        if self.0.borrow().refuse_start {
            return false;
        }
        self.0.borrow_mut().started += 1;
        true
    }

    fn write(&mut self, buf: &[u8]) -> bool {
        self.0.borrow_mut().bytes.extend_from_slice(buf);
        true
    }

    fn finish(&mut self) -> bool {
        self.0.borrow_mut().finished += 1;
        true
    }
}

fn test_config(buffer: usize) -> Config {
    let mut config = Config::default();
    config.server.username = String::from("admin");
    config.server.password = String::from("letmein");
    config.server.buffer_size = Some(buffer);
    config.server.data_timeout_ms = Some(400); // 5 ticks at the 80 ms cycle
    config
}

fn seed_file(backend: &dyn Backend, path: &str, data: &[u8]) {
    let handle = backend.open(path, OpenMode::WriteCreate).unwrap();
    backend.write(handle, data).unwrap();
    backend.close(handle).unwrap();
}

fn boot_with_config(config: Config) -> (FtpServer, MockController, Rc<RefCell<ProbeState>>) {
    let (stack, net) = MockStack::new();

    let flash = FlashFs::new(256 * 1024);
    flash.mkdir("sys").unwrap();
    seed_file(&flash, "boot.py", b"# boot script\n");
    let sd = SdFatFs::new();
    sd.mkdir("data").unwrap();
    seed_file(&sd, "log.txt", b"entry one\n");

    let mut vfs = VfsBridge::new();
    vfs.mount("flash", Box::new(flash));
    vfs.mount("sd", Box::new(sd));

    let probe = Rc::new(RefCell::new(ProbeState::default()));
    let updater = UpdaterProbe(Rc::clone(&probe));

    let mut server = FtpServer::new(config, Box::new(stack), vfs, Box::new(updater));
    server.enable();
    server.tick(); // Disabled -> Start
    server.tick(); // Start -> Ready, command listener up
    (server, net, probe)
}

fn boot(buffer: usize) -> (FtpServer, MockController, Rc<RefCell<ProbeState>>) {
    boot_with_config(test_config(buffer))
}

fn send_cmd(net: &MockController, sd: Sd, line: &str) {
    net.feed(sd, format!("{}\r\n", line).as_bytes());
}

/// Ticks until the command channel produced output (or gives up).
fn reply(server: &mut FtpServer, net: &MockController, sd: Sd) -> String {
    let mut out = String::new();
    for _ in 0..10 {
        server.tick();
        out.push_str(&net.take_tx_string(sd));
        if !out.is_empty() {
            break;
        }
    }
    out
}

fn connect(server: &mut FtpServer, net: &MockController) -> Sd {
    net.connect(21);
    server.tick();
    let sd = net.last_accepted(21).expect("command connection accepted");
    let greeting = net.take_tx_string(sd);
    assert!(greeting.starts_with("220 "), "greeting was {:?}", greeting);
    sd
}

fn login(server: &mut FtpServer, net: &MockController) -> Sd {
    let sd = connect(server, net);
    send_cmd(net, sd, "USER admin");
    assert!(reply(server, net, sd).starts_with("331"));
    send_cmd(net, sd, "PASS letmein");
    assert!(reply(server, net, sd).starts_with("230"));
    sd
}

/// PASV plus the client-side data connection.
fn open_data(server: &mut FtpServer, net: &MockController, cmd_sd: Sd) -> Sd {
    send_cmd(net, cmd_sd, "PASV");
    let pasv = reply(server, net, cmd_sd);
    assert!(pasv.starts_with("227"), "PASV reply was {:?}", pasv);
    net.connect(2024);
    server.tick();
    net.last_accepted(2024).expect("data connection accepted")
}

fn store(server: &mut FtpServer, net: &MockController, cmd_sd: Sd, path: &str, payload: &[u8]) {
    let data_sd = open_data(server, net, cmd_sd);
    send_cmd(net, cmd_sd, &format!("STOR {}", path));
    assert!(reply(server, net, cmd_sd).starts_with("150"));
    if !payload.is_empty() {
        net.feed(data_sd, payload);
    }
    net.close_peer(data_sd);
    let mut replies = String::new();
    for _ in 0..60 {
        server.tick();
        replies.push_str(&net.take_tx_string(cmd_sd));
        if replies.contains("226") {
            break;
        }
    }
    assert!(replies.contains("226"), "upload never completed: {:?}", replies);
    server.tick(); // retire the data sockets
}

fn retrieve(server: &mut FtpServer, net: &MockController, cmd_sd: Sd, path: &str) -> Vec<u8> {
    let data_sd = open_data(server, net, cmd_sd);
    send_cmd(net, cmd_sd, &format!("RETR {}", path));
    let mut data = Vec::new();
    let mut replies = String::new();
    for _ in 0..80 {
        server.tick();
        data.extend(net.take_tx(data_sd));
        replies.push_str(&net.take_tx_string(cmd_sd));
        if replies.contains("226") {
            break;
        }
    }
    assert!(replies.contains("150"), "download never started: {:?}", replies);
    assert!(replies.contains("226"), "download never completed: {:?}", replies);
    server.tick(); // retire the data sockets
    server.tick();
    data
}

fn run_listing(server: &mut FtpServer, net: &MockController, cmd_sd: Sd) -> Vec<String> {
    let data_sd = open_data(server, net, cmd_sd);
    send_cmd(net, cmd_sd, "LIST");
    let mut data = Vec::new();
    let mut replies = String::new();
    for _ in 0..120 {
        server.tick();
        data.extend(net.take_tx(data_sd));
        replies.push_str(&net.take_tx_string(cmd_sd));
        if replies.contains("226") {
            break;
        }
    }
    assert!(replies.contains("150"), "listing never started: {:?}", replies);
    assert!(replies.contains("226"), "listing never completed: {:?}", replies);
    server.tick();
    server.tick();
    let text = String::from_utf8_lossy(&data).into_owned();
    text.lines()
        .map(|line| line.trim_end())
        .filter(|line| !line.is_empty())
        .map(|line| line.rsplit(' ').next().unwrap_or("").to_string())
        .collect()
}

#[test]
fn greeting_then_login() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);
    send_cmd(&net, sd, "NOOP");
    assert!(reply(&mut server, &net, sd).starts_with("200"));
}

#[test]
fn commands_require_login() {
    let (mut server, net, _probe) = boot(512);
    let sd = connect(&mut server, &net);
    send_cmd(&net, sd, "PWD");
    assert!(reply(&mut server, &net, sd).starts_with("332"));
}

#[test]
fn auth_requires_exact_credentials() {
    let (mut server, net, _probe) = boot(512);
    let sd = connect(&mut server, &net);

    send_cmd(&net, sd, "USER admin1");
    assert!(reply(&mut server, &net, sd).starts_with("331"));
    send_cmd(&net, sd, "PASS letmein");
    assert!(reply(&mut server, &net, sd).starts_with("530"));

    send_cmd(&net, sd, "USER adm");
    assert!(reply(&mut server, &net, sd).starts_with("331"));
    send_cmd(&net, sd, "PASS letmein");
    assert!(reply(&mut server, &net, sd).starts_with("530"));

    send_cmd(&net, sd, "USER admin");
    assert!(reply(&mut server, &net, sd).starts_with("331"));
    send_cmd(&net, sd, "PASS letmein");
    assert!(reply(&mut server, &net, sd).starts_with("230"));
}

#[test]
fn repeated_login_failures_close_the_channel() {
    let (mut server, net, _probe) = boot(512);
    let sd = connect(&mut server, &net);
    for _ in 0..3 {
        send_cmd(&net, sd, "PASS nope");
        assert!(reply(&mut server, &net, sd).starts_with("530"));
    }
    send_cmd(&net, sd, "PASS nope");
    assert!(reply(&mut server, &net, sd).starts_with("421"));
    assert!(!net.is_open(sd));
    assert!(server.session.cmd_sd.is_none());
}

#[test]
fn unknown_command_is_rejected() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);
    send_cmd(&net, sd, "EPSV");
    assert!(reply(&mut server, &net, sd).starts_with("502"));
}

#[test]
fn pasv_is_idempotent() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);
    send_cmd(&net, sd, "PASV");
    assert!(reply(&mut server, &net, sd).contains("227 (192,168,4,1,7,232)"));
    net.connect(2024);
    server.tick();
    let first_data = net.last_accepted(2024).expect("data connection accepted");

    // rapid second PASV: the stale data connection is dropped and the
    // existing listener reused, never doubled
    send_cmd(&net, sd, "PASV");
    assert!(reply(&mut server, &net, sd).contains("227 (192,168,4,1,7,232)"));
    assert_eq!(net.listener_count(2024), 1);
    assert!(!net.is_open(first_data));
}

#[test]
fn stor_then_retr_round_trip() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);
    for (index, size) in [0usize, 1, 512, 513, 2048].into_iter().enumerate() {
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let path = format!("/flash/upload{}.bin", index);
        store(&mut server, &net, sd, &path, &payload);
        let fetched = retrieve(&mut server, &net, sd, &path);
        assert_eq!(fetched, payload, "size {} did not round-trip", size);
    }
}

#[test]
fn upload_lands_on_the_sd_volume_too() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);
    store(&mut server, &net, sd, "/sd/data/report.txt", b"report body");
    assert_eq!(server.vfs.stat("/sd/data/report.txt").unwrap().size, 11);
}

#[test]
fn root_listing_shows_the_volumes() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);
    let names = run_listing(&mut server, &net, sd);
    assert_eq!(names, vec!["flash", "sd"]);
}

#[test]
fn resumed_listing_is_complete_and_duplicate_free() {
    let expected: Vec<String> = (1..=12).map(|i| format!("file{:02}.txt", i)).collect();

    // tiny buffer: roughly one entry per tick, many forced resumptions
    let (mut server, net, _probe) = boot(64);
    for name in &expected {
        seed_via_bridge(&mut server, &format!("/sd/data/{}", name));
    }
    let sd = login(&mut server, &net);
    send_cmd(&net, sd, "CWD /sd/data");
    assert!(reply(&mut server, &net, sd).starts_with("250"));
    let mut small = run_listing(&mut server, &net, sd);

    // unconstrained pass over the same tree
    let (mut server2, net2, _probe2) = boot(4096);
    for name in &expected {
        seed_via_bridge(&mut server2, &format!("/sd/data/{}", name));
    }
    let sd2 = login(&mut server2, &net2);
    send_cmd(&net2, sd2, "CWD /sd/data");
    assert!(reply(&mut server2, &net2, sd2).starts_with("250"));
    let mut big = run_listing(&mut server2, &net2, sd2);

    small.sort();
    big.sort();
    assert_eq!(small, expected);
    assert_eq!(small, big);
}

fn seed_via_bridge(server: &mut FtpServer, path: &str) {
    let mut file = server.vfs.open(path, OpenMode::WriteCreate).unwrap();
    server.vfs.write(&mut file, b"x").unwrap();
    server.vfs.close(file).unwrap();
}

#[test]
fn firmware_upload_is_diverted_to_the_updater() {
    let (mut server, net, probe) = boot(512);
    let sd = login(&mut server, &net);
    let image: Vec<u8> = (0..1500u32).map(|i| (i % 256) as u8).collect();
    store(&mut server, &net, sd, "/flash/sys/appimg.bin", &image);

    let state = probe.borrow();
    assert_eq!(state.started, 1);
    assert!(state.finished >= 1);
    assert_eq!(state.bytes, image);
    drop(state);

    // nothing was written through the bridge
    assert_eq!(
        server.vfs.stat("/flash/sys/appimg.bin"),
        Err(VfsError::NotFound)
    );
    assert!(!server.session.special_transfer);
}

#[test]
fn refused_update_replies_550_and_unlocks() {
    let (mut server, net, probe) = boot(512);
    probe.borrow_mut().refuse_start = true;
    let sd = login(&mut server, &net);
    let _data_sd = open_data(&mut server, &net, sd);
    send_cmd(&net, sd, "STOR /flash/sys/appimg.bin");
    assert!(reply(&mut server, &net, sd).starts_with("550"));
    assert!(probe.borrow().finished >= 1);
}

#[test]
fn abandoned_download_cleans_up_within_bounded_ticks() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);
    let payload = vec![7u8; 5 * 512];
    store(&mut server, &net, sd, "/flash/big.bin", &payload);

    let data_sd = open_data(&mut server, &net, sd);
    send_cmd(&net, sd, "RETR /flash/big.bin");
    assert!(reply(&mut server, &net, sd).starts_with("150"));
    server.tick(); // first chunk goes out
    net.close_peer(data_sd); // client aborts the data connection

    for _ in 0..20 {
        server.tick();
    }
    assert_eq!(server.session.state, SessionState::Ready);
    assert!(matches!(server.session.open_resource, OpenResource::None));
    assert!(server.queue.is_empty());
}

#[test]
fn idle_command_channel_gets_a_goodbye() {
    let mut config = test_config(512);
    config.server.idle_timeout_ms = Some(400); // 5 ticks
    let (mut server, net, _probe) = boot_with_config(config);
    let sd = login(&mut server, &net);

    let mut replies = String::new();
    for _ in 0..12 {
        server.tick();
        replies.push_str(&net.take_tx_string(sd));
    }
    assert!(replies.contains("221"), "no goodbye in {:?}", replies);
    assert!(!net.is_open(sd));
}

#[test]
fn stalled_upload_is_aborted_with_426() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);
    let _data_sd = open_data(&mut server, &net, sd);
    send_cmd(&net, sd, "STOR /flash/stall.bin");
    assert!(reply(&mut server, &net, sd).starts_with("150"));

    let mut replies = String::new();
    for _ in 0..12 {
        server.tick();
        replies.push_str(&net.take_tx_string(sd));
    }
    assert!(replies.contains("426"), "no abort in {:?}", replies);
    for _ in 0..4 {
        server.tick();
    }
    assert_eq!(server.session.state, SessionState::Ready);
    assert!(matches!(server.session.open_resource, OpenResource::None));
}

#[test]
fn quit_flushes_before_closing() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);
    send_cmd(&net, sd, "QUIT");
    let goodbye = reply(&mut server, &net, sd);
    assert!(goodbye.starts_with("221"));
    assert!(!net.is_open(sd));
    assert!(server.session.cmd_sd.is_none());
}

#[test]
fn cwd_pwd_and_cdup_walk_the_tree() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);

    send_cmd(&net, sd, "CWD flash");
    assert!(reply(&mut server, &net, sd).starts_with("250"));
    send_cmd(&net, sd, "PWD");
    assert!(reply(&mut server, &net, sd).contains("/flash"));

    send_cmd(&net, sd, "CWD nosuchvolume");
    assert!(reply(&mut server, &net, sd).starts_with("550"));
    send_cmd(&net, sd, "PWD");
    assert!(reply(&mut server, &net, sd).contains("/flash"));

    send_cmd(&net, sd, "CDUP");
    assert!(reply(&mut server, &net, sd).starts_with("250"));
    send_cmd(&net, sd, "PWD");
    assert!(reply(&mut server, &net, sd).contains("257 /"));
}

#[test]
fn mkd_rename_and_remove() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);

    send_cmd(&net, sd, "MKD /sd/fresh");
    assert!(reply(&mut server, &net, sd).starts_with("250"));
    send_cmd(&net, sd, "RNFR /sd/fresh");
    assert!(reply(&mut server, &net, sd).starts_with("350"));
    send_cmd(&net, sd, "RNTO /sd/renamed");
    assert!(reply(&mut server, &net, sd).starts_with("250"));
    assert!(server.vfs.stat("/sd/renamed").unwrap().is_dir);

    send_cmd(&net, sd, "RMD /sd/renamed");
    assert!(reply(&mut server, &net, sd).starts_with("250"));
    assert_eq!(server.vfs.stat("/sd/renamed"), Err(VfsError::NotFound));
}

#[test]
fn cross_volume_rename_is_rejected() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);

    send_cmd(&net, sd, "RNFR /flash/boot.py");
    assert!(reply(&mut server, &net, sd).starts_with("350"));
    send_cmd(&net, sd, "RNTO /sd/boot.py");
    assert!(reply(&mut server, &net, sd).starts_with("550"));

    assert!(server.vfs.stat("/flash/boot.py").is_ok());
    assert_eq!(server.vfs.stat("/sd/boot.py"), Err(VfsError::NotFound));
}

#[test]
fn size_and_mdtm_report_metadata() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);

    send_cmd(&net, sd, "SIZE /flash/boot.py");
    assert!(reply(&mut server, &net, sd).starts_with("213 14"));

    send_cmd(&net, sd, "MDTM /sd/log.txt");
    let stamp = reply(&mut server, &net, sd);
    assert!(stamp.starts_with("213 "));
    let digits: String = stamp[4..].trim().to_string();
    assert_eq!(digits.len(), 14);
    assert!(digits.chars().all(|c| c.is_ascii_digit()));
}

#[test]
fn blocked_sends_retry_until_delivered() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);
    net.refuse_sends(sd, 3);
    send_cmd(&net, sd, "NOOP");
    let mut replies = String::new();
    for _ in 0..10 {
        server.tick();
        replies.push_str(&net.take_tx_string(sd));
        if !replies.is_empty() {
            break;
        }
    }
    assert!(replies.starts_with("200"));
    assert_eq!(server.session.tx_retries, 0);
}

#[test]
fn partial_sends_keep_the_entry_until_flushed() {
    let (mut server, net, _probe) = boot(512);
    let sd = login(&mut server, &net);
    net.partial_send(sd, 3);
    send_cmd(&net, sd, "NOOP");
    let mut replies = String::new();
    for _ in 0..10 {
        server.tick();
        replies.push_str(&net.take_tx_string(sd));
        if replies.len() >= 7 {
            break;
        }
    }
    assert_eq!(replies, "200 \r\n");
}

mod config;
mod constants;
mod core_cli;
mod core_ftpcommand;
mod core_network;
mod core_updater;
mod core_vfs;
mod helpers;
mod server;
mod session;

#[cfg(test)]
mod test_engine;

use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use env_logger::{Builder, Env};
use log::{info, Level};
use std::io::Write;

use crate::config::Config;
use crate::core_cli::Cli;
use crate::core_network::stack::SysNetworkStack;
use crate::core_updater::ImageUpdater;
use crate::core_vfs::bridge::VfsBridge;
use crate::core_vfs::flashfs::FlashFs;
use crate::core_vfs::sdfat::SdFatFs;
use crate::server::FtpServer;

/// Internal flash capacity reserved for the user volume.
const FLASH_CAPACITY: usize = 4 * 1024 * 1024;

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Initialize the logger with a custom format
    let default_filter = if args.verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(default_filter))
        .format(|buf, record| {
            let timestamp = buf.timestamp();
            let level = match record.level() {
                Level::Error => "ERROR".red(),
                Level::Warn => "WARN".yellow(),
                Level::Info => "INFO".green(),
                Level::Debug => "DEBUG".blue(),
                Level::Trace => "TRACE".normal(),
            };
            writeln!(buf, "[{}] [{}] {}", timestamp, level, record.args())
        })
        .init();

    // Determine the default config path based on the OS
    let default_config_path = if cfg!(target_os = "windows") {
        "C:\\src\\ferroftpd\\etc\\ferroftpd.conf"
    } else {
        "/etc/ferroftpd.conf"
    };

    // Load configuration from the TOML file
    let config_path = if args.config.is_empty() {
        default_config_path
    } else {
        args.config.as_str()
    };
    let config = Config::load_from_file(config_path)?;
    log_config(&config);

    let mut server = build_server(config);
    server.enable();
    info!("engine enabled, entering the scheduler loop");

    let cycle = Duration::from_millis(u64::from(server.config.cycle_time_ms()));
    loop {
        server.tick();
        thread::sleep(cycle);
    }
}

fn build_server(config: Config) -> FtpServer {
    use crate::core_vfs::backend::Backend;

    let mut vfs = VfsBridge::new();
    let flash = FlashFs::new(FLASH_CAPACITY);
    // the updater path lives under /flash/sys on a fresh module
    if let Err(err) = flash.mkdir("sys") {
        log::debug!("flash volume already initialized: {}", err);
    }
    vfs.mount("flash", Box::new(flash));
    vfs.mount("sd", Box::new(SdFatFs::new()));

    let update_path = config
        .server
        .update_path
        .clone()
        .unwrap_or_else(|| String::from("/flash/sys/appimg.bin"));
    let updater = ImageUpdater::new(&update_path);

    FtpServer::new(config, Box::new(SysNetworkStack::new()), vfs, Box::new(updater))
}

// Helper function to log configuration options
fn log_config(config: &Config) {
    info!("  Command Port: {}", config.server.cmd_port);
    info!("  Passive Port: {}", config.server.pasv_port);
    info!("  PASV Address: {}", config.server.pasv_address);
    info!("  Username: {}", config.server.username);
    info!("  Cycle Time: {} ms", config.cycle_time_ms());
    info!("  Transfer Buffer: {} bytes", config.buffer_size());
    if let Some(path) = &config.server.update_path {
        info!("  Firmware Update Path: {}", path);
    }
}

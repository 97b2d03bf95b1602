//! LIST and the tick-by-tick listing continuation.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use log::debug;

use crate::constants::{FTP_LIST_ENTRIES_PER_TICK, SECONDS_180_DAYS};
use crate::core_vfs::backend::DirEntry;
use crate::core_vfs::error::VfsResult;
use crate::server::FtpServer;
use crate::session::{ListingCursor, OpenResource, Session, SessionState};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Fixed date reported for volume roots and for entries with no
/// recorded modification time.
pub fn reference_mtime() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2015, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid reference date")
}

/// Handles the LIST FTP command. The listing itself is produced over
/// the following ticks.
pub fn handle_list_command(server: &mut FtpServer) {
    match open_dir_for_listing(server) {
        Ok(()) => {
            server.session.state = SessionState::ContinueListing;
            server.send_reply(150, None);
        }
        Err(err) => {
            debug!("LIST of {:?} failed: {}", server.session.cwd, err);
            server.send_reply(550, None);
        }
    }
}

fn open_dir_for_listing(server: &mut FtpServer) -> VfsResult<()> {
    server.close_files();
    let path = server.session.cwd.clone();
    if path == "/" {
        // the root is synthesized from the mount table
        server.session.cursor = ListingCursor {
            root: true,
            ..Default::default()
        };
        return Ok(());
    }
    let dir = server.vfs.opendir(&path)?;
    server.session.open_resource = OpenResource::Dir(dir);
    server.session.cursor = ListingCursor {
        root: false,
        dir_path: path,
        ..Default::default()
    };
    Ok(())
}

/// One listing tick: format as many entries as fit into one buffer,
/// once the previous buffer has left the queue. Zero bytes produced
/// means the listing is complete.
pub fn continue_listing(server: &mut FtpServer) {
    if !server.queue.is_empty() {
        return;
    }
    server.session.ctimeout = 0;
    let chunk = build_listing_chunk(server);
    if chunk.is_empty() {
        server.send_reply(226, None);
        server.session.state = SessionState::EndTransfer;
    } else {
        server.send_data(chunk);
    }
}

fn build_listing_chunk(server: &mut FtpServer) -> Vec<u8> {
    let limit = server.config.buffer_size();
    let now = Utc::now().naive_utc();
    let mut out: Vec<u8> = Vec::with_capacity(limit);

    if server.session.cursor.root {
        let mut listed = 0;
        while listed < FTP_LIST_ENTRIES_PER_TICK {
            let index = server.session.cursor.volume_index as usize;
            match server.vfs.volume(index) {
                Some(name) => {
                    let line = format_volume_entry(name, now);
                    if out.len() + line.len() > limit {
                        break;
                    }
                    out.extend_from_slice(line.as_bytes());
                    server.session.cursor.volume_index += 1;
                    listed += 1;
                }
                None => {
                    if out.is_empty() {
                        // mount table exhausted, nothing produced: done
                        server.session.cursor.volume_index = 0;
                    }
                    break;
                }
            }
        }
        return out;
    }

    let FtpServer { session, vfs, .. } = server;
    let Session {
        open_resource,
        cursor,
        ..
    } = session;

    // the directory was reopened last tick; the backends cannot seek,
    // so consume the already-listed entries again before going on
    if cursor.replay_pending {
        if let OpenResource::Dir(dir) = &*open_resource {
            let mut skipped = 0;
            while skipped < cursor.last_emitted_index {
                match vfs.readdir(dir) {
                    Ok(Some(_)) => skipped += 1,
                    _ => break,
                }
            }
        }
        cursor.replay_pending = false;
    }

    let mut listed = 0;
    let mut finished = false;
    let mut deferred = false;
    while listed < FTP_LIST_ENTRIES_PER_TICK && !finished && !deferred {
        let OpenResource::Dir(dir) = &*open_resource else {
            finished = true;
            break;
        };
        match vfs.readdir(dir) {
            Ok(Some(entry)) => {
                if entry.name == "." || entry.name == ".." {
                    // counted so replay stays aligned, never emitted
                    cursor.last_emitted_index += 1;
                    continue;
                }
                let line = format_list_entry(&entry, now);
                if out.len() + line.len() > limit {
                    deferred = true;
                } else {
                    out.extend_from_slice(line.as_bytes());
                    cursor.last_emitted_index += 1;
                    listed += 1;
                }
            }
            Ok(None) | Err(_) => finished = true,
        }
    }

    if deferred {
        // the entry that did not fit is re-read next tick; reopen so
        // the iterator restarts from a known position
        if let OpenResource::Dir(dir) = std::mem::take(open_resource) {
            match vfs.reopendir(dir) {
                Ok(fresh) => {
                    *open_resource = OpenResource::Dir(fresh);
                    cursor.replay_pending = true;
                }
                Err(err) => debug!("reopening {:?} failed: {}", cursor.dir_path, err),
            }
        }
    } else if finished {
        if let OpenResource::Dir(dir) = std::mem::take(open_resource) {
            vfs.closedir(dir);
        }
    }
    out
}

/// One Unix-`ls`-style line. Entries older than 180 days show the
/// year, newer ones the time of day.
pub fn format_list_entry(entry: &DirEntry, now: NaiveDateTime) -> String {
    let kind = if entry.is_dir { "d" } else { "-" };
    let mtime = entry.mtime.unwrap_or_else(reference_mtime);
    let month = MONTHS[mtime.month0() as usize];
    if now.signed_duration_since(mtime) > Duration::seconds(SECONDS_180_DAYS) {
        format!(
            "{}rw-rw-r--   1 root  root {:9} {} {:2} {:5} {}\r\n",
            kind,
            entry.size,
            month,
            mtime.day(),
            mtime.year(),
            entry.name
        )
    } else {
        format!(
            "{}rw-rw-r--   1 root  root {:9} {} {:2} {:02}:{:02} {}\r\n",
            kind,
            entry.size,
            month,
            mtime.day(),
            mtime.hour(),
            mtime.minute(),
            entry.name
        )
    }
}

pub fn format_volume_entry(name: &str, now: NaiveDateTime) -> String {
    format_list_entry(
        &DirEntry {
            name: name.to_string(),
            size: 0,
            is_dir: true,
            mtime: Some(reference_mtime()),
        },
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn old_entries_show_the_year() {
        let now = Utc::now().naive_utc();
        let line = format_volume_entry("flash", now);
        assert_eq!(
            line,
            "drw-rw-r--   1 root  root         0 Jan  1  2015 flash\r\n"
        );
    }

    #[test]
    fn recent_entries_show_the_time() {
        let now = Utc::now().naive_utc();
        let entry = DirEntry {
            name: String::from("log.txt"),
            size: 42,
            is_dir: false,
            mtime: Some(now - Duration::hours(1)),
        };
        let line = format_list_entry(&entry, now);
        assert!(line.starts_with("-rw-rw-r--"));
        assert!(line.contains(':'));
        assert!(line.ends_with("log.txt\r\n"));
    }

    #[test]
    fn missing_mtime_falls_back_to_reference_date() {
        let now = Utc::now().naive_utc();
        let entry = DirEntry {
            name: String::from("boot.py"),
            size: 13,
            is_dir: false,
            mtime: None,
        };
        let line = format_list_entry(&entry, now);
        assert!(line.contains(" 2015 "));
    }
}

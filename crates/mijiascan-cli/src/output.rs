//! Final value output: one line per device per reading kind.
//!
//! File output takes an exclusive advisory lock so a concurrent reader can
//! wait for a consistent file instead of seeing a half-written one.

use mijiascan::{AveragedReadings, DeviceAddress};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::Duration;

const BAD_FILENAME_CHARS: &[char] = &['!', '@', '%', '^', '*', '~', '|'];
const MAX_FILENAME_LEN: usize = 255;
const LOCK_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Rejects paths with shell metacharacters or excessive length.
pub fn valid_filename(path: &str) -> bool {
    path.len() <= MAX_FILENAME_LEN && !path.contains(BAD_FILENAME_CHARS)
}

/// Writes the snapshot to the given file (under an exclusive lock) or to
/// stdout.
pub fn write_values(
    path: Option<&str>,
    snapshot: &HashMap<DeviceAddress, AveragedReadings>,
) -> io::Result<()> {
    match path {
        Some(path) => {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            lock_exclusive(&file);
            let mut writer = BufWriter::new(&file);
            let result = write_lines(&mut writer, snapshot).and_then(|()| writer.flush());
            drop(writer);
            unlock(&file);
            result
        }
        None => {
            let stdout = io::stdout();
            write_lines(&mut stdout.lock(), snapshot)
        }
    }
}

fn lock_exclusive(file: &File) {
    while unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) } != 0 {
        thread::sleep(LOCK_RETRY_DELAY);
    }
}

fn unlock(file: &File) {
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

fn write_lines<W: Write>(
    out: &mut W,
    snapshot: &HashMap<DeviceAddress, AveragedReadings>,
) -> io::Result<()> {
    let mut entries: Vec<_> = snapshot.iter().collect();
    entries.sort_by_key(|(address, _)| address.to_string());

    for (address, readings) in entries {
        if let Some(t) = readings.temperature {
            writeln!(out, "T {} {} {:.1}", address, t.at, t.value)?;
        }
        if let Some(h) = readings.humidity {
            writeln!(out, "H {} {} {:.1}", address, h.at, h.value)?;
        }
        if let Some((level, at)) = readings.battery {
            writeln!(out, "B {} {} {}", address, at, level)?;
        }
    }
    Ok(())
}

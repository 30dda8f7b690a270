// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{WorkerId, WorkerSet};
use camino::Utf8PathBuf;
use std::fs;
use tracing::debug;

const TASK_DIR: &str = "/proc/self/task";

pub(super) const CENSUS_SUPPORTED: bool = true;

pub(super) fn current_worker() -> WorkerId {
    // SAFETY: gettid has no preconditions and always succeeds.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    WorkerId::from_raw(tid as u64)
}

pub(super) fn live_workers() -> WorkerSet {
    let entries = match fs::read_dir(TASK_DIR) {
        Ok(entries) => entries,
        Err(error) => {
            debug!("failed to read {TASK_DIR}: {error}");
            return WorkerSet::new();
        }
    };

    // Threads may exit while the directory is being read, so errors on individual entries are
    // skipped.
    entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            entry.file_name().to_str()?.parse::<u64>().ok()
        })
        .map(WorkerId::from_raw)
        .collect()
}

pub(super) fn is_alive(id: WorkerId) -> bool {
    let Ok(stat) = fs::read_to_string(task_path(id, "stat")) else {
        return false;
    };
    // The format is "<tid> (<comm>) <state> ...". comm may itself contain parentheses and
    // spaces, so look for the state after the last closing parenthesis.
    let state = stat
        .rfind(')')
        .and_then(|idx| stat[idx + 1..].trim_start().chars().next());
    !matches!(state, None | Some('Z' | 'X' | 'x'))
}

pub(super) fn thread_name(id: WorkerId) -> Option<String> {
    let comm = fs::read_to_string(task_path(id, "comm")).ok()?;
    let comm = comm.trim_end_matches('\n');
    (!comm.is_empty()).then(|| comm.to_owned())
}

fn task_path(id: WorkerId, file: &str) -> Utf8PathBuf {
    let mut path = Utf8PathBuf::from(TASK_DIR);
    path.push(id.to_string());
    path.push(file);
    path
}

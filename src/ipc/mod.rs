// domed — adaptive dome tracking control core
// Copyright (C) 2024 Filip Szczerek <ga.software@yahoo.com>
//
// This file is part of domed
//
// domed is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License version 3
// as published by the Free Software Foundation.
//
// domed is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with domed.  If not, see <http://www.gnu.org/licenses/>.

// Race-free snapshot exchange between processes without a broker: one
// writer per shared piece of state, atomic publish (write-temp,
// lock-exclusive, rename, unlock), non-blocking shared-lock reads that
// degrade to "no new data" on any contention or parse failure rather than
// erroring. See DESIGN.md.

pub mod encoder_snapshot;
pub mod motor_command;
pub mod motor_status;

use crate::error::IpcFault;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Serializes `value` and atomically installs it at `path`.
pub fn publish<T: Serialize>(path: &Path, value: &T) -> Result<(), IpcFault> {
    let json = serde_json::to_vec(value).map_err(IpcFault::Serialize)?;

    let tmp_path = sibling_tmp_path(path);
    {
        let mut tmp = File::create(&tmp_path).map_err(|source| io_fault(&tmp_path, source))?;
        tmp.write_all(&json)
            .map_err(|source| io_fault(&tmp_path, source))?;
    }

    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .map_err(|source| io_fault(path, source))?;
    lock_file
        .lock_exclusive()
        .map_err(|source| io_fault(path, source))?;

    let result = fs::rename(&tmp_path, path).map_err(|source| io_fault(path, source));
    let _ = FileExt::unlock(&lock_file);
    result
}

/// Reads the last-published snapshot at `path`, or `None` if the lock is
/// contended, the file is missing, or its contents don't parse (all three
/// are "no new data", never an error).
pub fn read<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let mut file = File::open(path).ok()?;
    if file.try_lock_shared().is_err() {
        return None;
    }
    let mut contents = String::new();
    let read_ok = file.read_to_string(&mut contents).is_ok();
    let _ = FileExt::unlock(&file);
    if !read_ok {
        return None;
    }
    serde_json::from_str(&contents).ok()
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "snapshot".to_string());
    let mut tmp = path.to_path_buf();
    tmp.set_file_name(format!(".{file_name}.tmp"));
    tmp
}

fn io_fault(path: &Path, source: std::io::Error) -> IpcFault {
    IpcFault::Io {
        path: path.display().to_string(),
        source,
    }
}

// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fs::File, os::unix::fs::FileExt};
use tracing::warn;

/// Returns the abbreviated name of a signal, e.g. `SEGV` for 11.
pub(crate) fn signal_str(signal: i32) -> Option<&'static str> {
    // These signal numbers are the same on at least Linux, macOS and FreeBSD.
    match signal {
        1 => Some("HUP"),
        2 => Some("INT"),
        3 => Some("QUIT"),
        4 => Some("ILL"),
        5 => Some("TRAP"),
        6 => Some("ABRT"),
        8 => Some("FPE"),
        9 => Some("KILL"),
        11 => Some("SEGV"),
        13 => Some("PIPE"),
        14 => Some("ALRM"),
        15 => Some("TERM"),
        _ => None,
    }
}

/// Reads the bytes in `[start, end)` of a capture file, or up to the end of the file if `end` is
/// `None` or lies past it.
///
/// Offsets come from the worker; a negative start (output is not a regular file) or an empty range
/// yields no output. Invalid UTF-8 is replaced.
pub(crate) fn read_capture(file: &File, start: i64, end: Option<i64>) -> String {
    let Ok(start) = u64::try_from(start) else {
        return String::new();
    };
    let file_len = match file.metadata() {
        Ok(metadata) => metadata.len(),
        Err(error) => {
            warn!(%error, "failed to stat capture file");
            return String::new();
        }
    };
    let end = match end {
        Some(end) => match u64::try_from(end) {
            Ok(end) => end.min(file_len),
            Err(_) => return String::new(),
        },
        None => file_len,
    };
    if end <= start {
        return String::new();
    }

    let Ok(len) = usize::try_from(end - start) else {
        return String::new();
    };
    let mut buf = vec![0u8; len];
    match file.read_exact_at(&mut buf, start) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(error) => {
            warn!(start, end, %error, "failed to read captured output");
            String::new()
        }
    }
}

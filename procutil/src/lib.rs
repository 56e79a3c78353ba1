//! Process-spawning helpers shared by the muxer's external tool invocation.

use std::ffi::OsStr;
use std::io;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Classifies a spawn failure so callers can distinguish a missing binary
/// (install-hint territory) from other launch failures (permissions, etc).
pub fn is_tool_missing(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}

/// Returns the trailing `max_bytes` of a diagnostic stream, splitting on a
/// UTF-8 boundary so the output never contains a partial multi-byte sequence.
pub fn tail_bytes(data: &[u8], max_bytes: usize) -> String {
    let start = data.len().saturating_sub(max_bytes);
    let mut slice = &data[start..];
    while !slice.is_empty() && std::str::from_utf8(slice).is_err() {
        slice = &slice[1..];
    }
    String::from_utf8_lossy(slice).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_missing_detects_not_found() {
        let err = io::Error::from(io::ErrorKind::NotFound);
        assert!(is_tool_missing(&err));
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(!is_tool_missing(&err));
    }

    #[test]
    fn tail_bytes_respects_utf8_boundaries() {
        let s = "héllo wörld, this is a diagnostic line".as_bytes();
        let tail = tail_bytes(s, 6);
        assert!(std::str::from_utf8(tail.as_bytes()).is_ok());
    }

    #[test]
    fn tail_bytes_shorter_than_max_returns_all() {
        let s = b"short";
        assert_eq!(tail_bytes(s, 100), "short");
    }
}

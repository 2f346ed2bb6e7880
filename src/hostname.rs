//! System hostname detection

use std::ffi::CStr;
use std::io;

use libc::{c_char, size_t};

/// Returns the system hostname.
pub fn get_hostname() -> io::Result<String> {
    let mut buf = [0 as c_char; 256];
    // The last byte stays zero so the result is always terminated.
    let res = unsafe { libc::gethostname(buf.as_mut_ptr(), (buf.len() - 1) as size_t) };

    if res == -1 {
        return Err(io::Error::last_os_error());
    }

    let s = unsafe { CStr::from_ptr(buf.as_ptr()) };
    s.to_str()
        .map(|s| s.to_owned())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid hostname"))
}

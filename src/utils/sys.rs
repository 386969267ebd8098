use std::io;

/// Converts a `-1`-on-error libc return value into an [`io::Result`].
pub(crate) fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(ret)
}

/// Same as [`cvt`] for the `ssize_t` returned by read/write style calls.
pub(crate) fn cvt_size(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(ret as usize)
}

/// `EINTR`, `EAGAIN` and `EWOULDBLOCK` only mean "try again on the next
/// readiness notification".
pub(crate) fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

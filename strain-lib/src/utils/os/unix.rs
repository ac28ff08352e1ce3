use rama::telemetry::tracing;

pub use libc::rlim_t;

/// Raise the soft `RLIMIT_NOFILE` limit towards `target`, capped by the hard limit.
///
/// Every request worker keeps at least one socket open,
/// so large worker pools run into the (often tiny) default soft limit.
pub fn raise_nofile(target: rlim_t) -> std::io::Result<()> {
    use std::{io, mem};

    // SAFETY: `lim` is a plain C struct fully initialised by `getrlimit`
    // before it is read, and only passed by pointer to libc.
    unsafe {
        let mut lim: libc::rlimit = mem::zeroed();
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) != 0 {
            return Err(io::Error::last_os_error());
        }

        let hard = lim.rlim_max;
        let new_soft = target.min(hard);

        if lim.rlim_cur >= new_soft {
            tracing::debug!(
                current = lim.rlim_cur,
                requested = new_soft,
                "ulimit: current soft limit already covers the requested limit",
            );
            return Ok(());
        }

        let previous = lim.rlim_cur;
        lim.rlim_cur = new_soft;
        if libc::setrlimit(libc::RLIMIT_NOFILE, &lim) != 0 {
            return Err(io::Error::last_os_error());
        }

        tracing::info!(previous, new_soft, "ulimit: raised soft limit for open files");
    }

    Ok(())
}

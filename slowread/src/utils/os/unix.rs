use rama::telemetry::tracing;

pub use libc::rlim_t;

/// Raise the soft `RLIMIT_NOFILE` limit towards `target`, capped by the hard limit.
///
/// Every simulated client holds one socket for the whole read window,
/// so large batches run out of descriptors long before they run out of memory.
///
/// Returns the soft limit in effect after the call.
pub fn raise_nofile(target: rlim_t) -> std::io::Result<rlim_t> {
    use std::{io, mem};

    // SAFETY: `rlimit` is plain old data and both calls only read/write the struct we own.
    unsafe {
        let mut lim: libc::rlimit = mem::zeroed();
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) != 0 {
            return Err(io::Error::last_os_error());
        }

        let new_soft = target.min(lim.rlim_max);
        if lim.rlim_cur >= new_soft {
            tracing::debug!(
                current = lim.rlim_cur,
                requested = new_soft,
                "ulimit: current nofile limit suffices",
            );
            return Ok(lim.rlim_cur);
        }

        let previous = lim.rlim_cur;
        lim.rlim_cur = new_soft;
        if libc::setrlimit(libc::RLIMIT_NOFILE, &lim) != 0 {
            return Err(io::Error::last_os_error());
        }

        tracing::info!(previous, applied = new_soft, "ulimit: raised nofile soft limit");
        Ok(new_soft)
    }
}

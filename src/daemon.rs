// DETACH FROM THE CONTROLLING TERMINAL: FORK, setsid, chdir("/"),
// STDIO TO /dev/null. MUST RUN BEFORE THE LOGGER AND SIGNAL HANDLER.

use anyhow::{Context, Result};

pub fn daemonize() -> Result<()> {
    if unsafe { libc::daemon(0, 0) } != 0 {
        return Err(std::io::Error::last_os_error()).context("Failed to daemonize");
    }
    Ok(())
}

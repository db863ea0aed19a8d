use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Poll `ready` until it returns true or `timeout` expires, sleeping
/// `poll_interval` between checks. `what` names the condition in the error.
pub fn wait_until_with_timeout(
    mut ready: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
    what: &str,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !ready() {
        if Instant::now() >= deadline {
            return Err(HwError::Timeout(what.to_string()));
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

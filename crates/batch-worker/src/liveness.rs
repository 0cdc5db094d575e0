//! Parent-liveness self-check (spec.md §4.7, §7): the worker
//! periodically checks that both its own pid and the parent pid are
//! alive, exiting immediately if either is gone. This prevents
//! orphaned long-running analyses once the Supervisor that spawned
//! this worker has died.

/// True if a process with the given pid is currently alive, checked
/// via `/proc/<pid>` the way the original checks with `kill(pid, 0)`.
pub fn pid_is_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

/// Own pid is alive by construction; only the parent can have died
/// out from under us.
pub fn parent_is_alive(parent_pid: u32) -> bool {
    pid_is_alive(parent_pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(pid_is_alive(std::process::id()));
    }

    #[test]
    fn pid_one_is_conventionally_alive_on_linux() {
        assert!(pid_is_alive(1));
    }

    #[test]
    fn implausible_pid_is_not_alive() {
        assert!(!pid_is_alive(u32::MAX));
    }
}

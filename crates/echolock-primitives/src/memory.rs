//! Memory protection for sensitive data.
//!
//! Provides two hardening measures:
//!
//! 1. **Core dump prevention** — Disables core dumps via
//!    `setrlimit(RLIMIT_CORE, 0)` so a crash never writes key material to
//!    disk.
//! 2. **Memory locking** — Locks a memory region via `mlock()` to prevent
//!    the OS from swapping session keys or shares to disk.
//!
//! Both are best-effort: failures are logged but never abort the process,
//! since some environments (containers, unprivileged users) don't permit
//! these operations.

use std::sync::atomic::{AtomicBool, Ordering};

static CORE_DUMPS_DISABLED: AtomicBool = AtomicBool::new(false);

/// Disable core dumps for the current process. Call once, early in
/// `main`, before any key material is derived.
pub fn disable_core_dumps() -> bool {
    if CORE_DUMPS_DISABLED.swap(true, Ordering::SeqCst) {
        return true;
    }

    #[cfg(unix)]
    {
        unix::disable_core_dumps_impl()
    }

    #[cfg(not(unix))]
    {
        eprintln!("[echolock] warning: core dump prevention not supported on this platform");
        false
    }
}

/// Lock a memory region to prevent it from being swapped to disk.
///
/// # Safety
/// `ptr` must point to a valid allocation of at least `len` bytes. The
/// caller must unlock (`munlock`) before the allocation is freed, or rely
/// on process exit to unlock implicitly.
pub unsafe fn mlock(ptr: *const u8, len: usize) -> bool {
    if len == 0 {
        return true;
    }

    #[cfg(unix)]
    {
        unix::mlock_impl(ptr, len)
    }

    #[cfg(not(unix))]
    {
        let _ = (ptr, len);
        false
    }
}

/// Unlock a region previously locked with [`mlock`].
///
/// # Safety
/// `ptr` and `len` must match a prior `mlock` call.
pub unsafe fn munlock(ptr: *const u8, len: usize) -> bool {
    if len == 0 {
        return true;
    }

    #[cfg(unix)]
    {
        unix::munlock_impl(ptr, len)
    }

    #[cfg(not(unix))]
    {
        let _ = (ptr, len);
        true
    }
}

/// A buffer that mlocks its contents on creation and zeroizes + munlocks
/// on drop. Use for session keys, shares and reconstructed secrets —
/// anything covered by the zeroization discipline in spec §3.
pub struct LockedBuffer {
    data: Vec<u8>,
    locked: bool,
}

impl LockedBuffer {
    pub fn new(len: usize) -> Self {
        let data = vec![0u8; len];
        let locked = if data.is_empty() {
            true
        } else {
            unsafe { mlock(data.as_ptr(), data.len()) }
        };

        if !locked {
            eprintln!(
                "[echolock] warning: failed to mlock {} bytes — secret may be swappable",
                len
            );
        }

        Self { data, locked }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Drop for LockedBuffer {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.data.zeroize();

        if self.locked && !self.data.is_empty() {
            unsafe {
                munlock(self.data.as_ptr(), self.data.len());
            }
        }
    }
}

#[cfg(unix)]
mod unix {
    pub fn disable_core_dumps_impl() -> bool {
        // SAFETY: setrlimit with RLIMIT_CORE=0 is a standard POSIX call.
        unsafe {
            let rlim = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            if libc::setrlimit(libc::RLIMIT_CORE, &rlim) != 0 {
                let errno = std::io::Error::last_os_error();
                eprintln!("[echolock] warning: failed to disable core dumps: {}", errno);
                return false;
            }
        }
        true
    }

    pub unsafe fn mlock_impl(ptr: *const u8, len: usize) -> bool {
        let result = libc::mlock(ptr as *const libc::c_void, len);
        if result != 0 {
            let errno = std::io::Error::last_os_error();
            eprintln!("[echolock] warning: mlock failed for {} bytes: {}", len, errno);
            return false;
        }
        true
    }

    pub unsafe fn munlock_impl(ptr: *const u8, len: usize) -> bool {
        libc::munlock(ptr as *const libc::c_void, len) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disable_core_dumps_is_idempotent() {
        let first = disable_core_dumps();
        eprintln!("core dump disable result: {}", first);
        assert!(disable_core_dumps(), "second call should report already-disabled");
    }

    #[test]
    fn locked_buffer_read_write() {
        let mut buf = LockedBuffer::new(64);
        buf.as_mut_slice()[0] = 0xDE;
        buf.as_mut_slice()[1] = 0xAD;
        assert_eq!(buf.as_slice()[0], 0xDE);
        assert_eq!(buf.as_slice().len(), 64);
    }

    #[test]
    fn locked_buffer_zero_length() {
        let buf = LockedBuffer::new(0);
        assert!(buf.is_locked());
        assert!(buf.as_slice().is_empty());
    }

    #[test]
    fn locked_buffer_zeroizes_on_drop() {
        let mut buf = LockedBuffer::new(32);
        buf.as_mut_slice().fill(0xFF);
        assert!(buf.as_slice().iter().all(|&b| b == 0xFF));

        use zeroize::Zeroize;
        buf.data.zeroize();
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }
}

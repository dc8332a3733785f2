use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Producer-thread identity copied into every slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: u64,
    pub name: Arc<str>,
    pub priority: i32,
}

/// Whether a thread's name is captured once or re-read on each publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ThreadNameStrategy {
    #[default]
    Cached,
    Uncached,
}

impl ThreadNameStrategy {
    /// Parse a configured value, using the default for anything unrecognised.
    pub fn from_config(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }

    /// Identity of the calling thread according to this strategy.
    pub fn current(self) -> ThreadInfo {
        THREAD_INFO
            .try_with(|cell| {
                let mut slot = cell.borrow_mut();
                let state = slot.get_or_insert_with(ThreadState::capture);
                match self {
                    ThreadNameStrategy::Cached => state.captured.clone(),
                    ThreadNameStrategy::Uncached => {
                        state.refresh_latest();
                        ThreadInfo {
                            name: Arc::clone(&state.latest_name),
                            ..state.captured.clone()
                        }
                    }
                }
            })
            .unwrap_or_else(|_| ThreadInfo::capture())
    }
}

impl FromStr for ThreadNameStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CACHED" => Ok(ThreadNameStrategy::Cached),
            "UNCACHED" => Ok(ThreadNameStrategy::Uncached),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for ThreadNameStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadNameStrategy::Cached => f.write_str("CACHED"),
            ThreadNameStrategy::Uncached => f.write_str("UNCACHED"),
        }
    }
}

thread_local! {
    static THREAD_INFO: RefCell<Option<ThreadState>> = const { RefCell::new(None) };
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

// Linux limits thread names to 15 bytes plus the terminator.
const THREAD_NAME_CAPACITY: usize = 16;

// `captured` is frozen on first use; `latest_name` tracks the OS name.
struct ThreadState {
    captured: ThreadInfo,
    latest_name: Arc<str>,
}

impl ThreadState {
    fn capture() -> Self {
        let captured = ThreadInfo::capture();
        let latest_name = Arc::clone(&captured.name);
        Self {
            captured,
            latest_name,
        }
    }

    // Reuses the existing allocation unless the name actually changed.
    fn refresh_latest(&mut self) {
        let mut buf = [0u8; THREAD_NAME_CAPACITY];
        if let Some(current) = os_thread_name(&mut buf) {
            if &*self.latest_name != current {
                self.latest_name = Arc::from(current);
            }
        }
    }
}

impl ThreadInfo {
    fn capture() -> Self {
        let mut buf = [0u8; THREAD_NAME_CAPACITY];
        let name = match os_thread_name(&mut buf) {
            Some(name) => Arc::from(name),
            None => fallback_thread_name(),
        };
        Self {
            id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
            name,
            priority: os_thread_priority(),
        }
    }
}

fn fallback_thread_name() -> Arc<str> {
    let current = std::thread::current();
    match current.name() {
        Some(name) => Arc::from(name),
        None => Arc::from(format!("{:?}", current.id())),
    }
}

#[cfg(target_os = "linux")]
fn os_thread_name(buf: &mut [u8; THREAD_NAME_CAPACITY]) -> Option<&str> {
    let rc = unsafe {
        libc::pthread_getname_np(
            libc::pthread_self(),
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
        )
    };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..len]).ok().filter(|s| !s.is_empty())
}

#[cfg(not(target_os = "linux"))]
fn os_thread_name(_buf: &mut [u8; THREAD_NAME_CAPACITY]) -> Option<&str> {
    None
}

#[cfg(target_os = "linux")]
fn os_thread_priority() -> i32 {
    // Nice value of the calling thread.
    unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) }
}

#[cfg(not(target_os = "linux"))]
fn os_thread_priority() -> i32 {
    0
}

/// Sets the OS-level name of the calling thread.
///
/// Rust's `Thread::name` is fixed at spawn time; this changes the name that
/// [`ThreadNameStrategy::Uncached`] reads. Names longer than 15 bytes are
/// truncated. Returns false when the platform does not support renaming.
pub fn set_current_thread_name(name: &str) -> bool {
    #[cfg(target_os = "linux")]
    {
        let mut bytes: Vec<u8> = name.bytes().filter(|&b| b != 0).collect();
        bytes.truncate(THREAD_NAME_CAPACITY - 1);
        let Ok(c_name) = std::ffi::CString::new(bytes) else {
            return false;
        };
        unsafe { libc::pthread_setname_np(libc::pthread_self(), c_name.as_ptr()) == 0 }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = name;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn parses_strategy_names() {
        assert_eq!(ThreadNameStrategy::from_config(Some("uncached")), ThreadNameStrategy::Uncached);
        assert_eq!(ThreadNameStrategy::from_config(Some("CACHED")), ThreadNameStrategy::Cached);
        assert_eq!(ThreadNameStrategy::from_config(Some("sometimes")), ThreadNameStrategy::Cached);
        assert_eq!(ThreadNameStrategy::from_config(None), ThreadNameStrategy::Cached);
    }

    #[test]
    fn captures_spawned_thread_name() {
        let info = thread::Builder::new()
            .name("worker-7".into())
            .spawn(|| ThreadNameStrategy::Cached.current())
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(&*info.name, "worker-7");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn uncached_sees_rename_cached_does_not() {
        let (cached, uncached) = thread::Builder::new()
            .name("before".into())
            .spawn(|| {
                let first = ThreadNameStrategy::Cached.current();
                assert_eq!(&*first.name, "before");
                assert!(set_current_thread_name("after"));
                (ThreadNameStrategy::Cached.current(), ThreadNameStrategy::Uncached.current())
            })
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(&*cached.name, "before");
        assert_eq!(&*uncached.name, "after");
        assert_eq!(cached.id, uncached.id);
    }
}

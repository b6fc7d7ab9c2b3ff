//! Linux perf events backend
//!
//! Each counter is one `perf_event_open(2)` descriptor counting the calling
//! process on any CPU. `inherit` carries the counter into threads created
//! after it was opened, so the worker threads are included as long as the
//! counter exists before they start.

use super::{CounterSelector, CounterSource};
use crate::Result;
use anyhow::Context;
use std::fs::File;
use std::io::Read;
use std::os::unix::io::{AsRawFd, FromRawFd};

// _IO('$', 0), _IO('$', 1), _IO('$', 3)
const PERF_EVENT_IOC_ENABLE: libc::c_ulong = 0x2400;
const PERF_EVENT_IOC_DISABLE: libc::c_ulong = 0x2401;
const PERF_EVENT_IOC_RESET: libc::c_ulong = 0x2403;

const ATTR_FLAG_DISABLED: u64 = 1 << 0;
const ATTR_FLAG_INHERIT: u64 = 1 << 1;
const ATTR_FLAG_EXCLUDE_HV: u64 = 1 << 6;

/// `struct perf_event_attr`, first published revision (`PERF_ATTR_SIZE_VER0`)
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct EventAttr {
    type_: u32,
    size: u32,
    config: u64,
    sample_period: u64,
    sample_type: u64,
    read_format: u64,
    flags: u64,
    wakeup_events: u32,
    bp_type: u32,
    config1: u64,
}

impl EventAttr {
    pub(crate) fn for_selector(selector: &CounterSelector) -> Self {
        Self {
            type_: selector.kind.type_id(),
            size: std::mem::size_of::<Self>() as u32,
            config: selector.config,
            flags: ATTR_FLAG_DISABLED | ATTR_FLAG_INHERIT | ATTR_FLAG_EXCLUDE_HV,
            ..Self::default()
        }
    }
}

/// One open perf event
pub struct PerfCounter {
    file: File,
    name: &'static str,
}

impl PerfCounter {
    /// Open a disabled counter for this process; `start` enables it
    pub fn open(selector: &CounterSelector) -> Result<Self> {
        let attr = EventAttr::for_selector(selector);
        let fd = unsafe {
            libc::syscall(
                libc::SYS_perf_event_open,
                &attr as *const EventAttr,
                0 as libc::pid_t,
                -1 as libc::c_int,
                -1 as libc::c_int,
                0 as libc::c_ulong,
            )
        };
        if fd < 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).with_context(|| {
                format!(
                    "perf_event_open failed for counter {} (check /proc/sys/kernel/perf_event_paranoid)",
                    selector
                )
            });
        }

        Ok(Self {
            file: unsafe { File::from_raw_fd(fd as libc::c_int) },
            name: selector.name,
        })
    }

    fn control(&self, request: libc::c_ulong, what: &str) -> Result<()> {
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), request, 0) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).with_context(|| format!("Failed to {} counter {}", what, self.name));
        }
        Ok(())
    }
}

impl CounterSource for PerfCounter {
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn start(&mut self) -> Result<()> {
        self.control(PERF_EVENT_IOC_RESET, "reset")?;
        self.control(PERF_EVENT_IOC_ENABLE, "enable")
    }

    fn read(&mut self) -> Result<u64> {
        let mut value = [0u8; 8];
        (&self.file)
            .read_exact(&mut value)
            .with_context(|| format!("Failed to read counter {}", self.name))?;
        Ok(u64::from_ne_bytes(value))
    }
}

impl Drop for PerfCounter {
    fn drop(&mut self) {
        let _ = self.control(PERF_EVENT_IOC_DISABLE, "disable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perf::EventKind;

    #[test]
    fn test_attr_layout() {
        assert_eq!(std::mem::size_of::<EventAttr>(), 64);
    }

    #[test]
    fn test_attr_for_selector() {
        let selector: CounterSelector = "branch-misses".parse().unwrap();
        let attr = EventAttr::for_selector(&selector);
        assert_eq!(attr.type_, EventKind::Hardware.type_id());
        assert_eq!(attr.config, 5);
        assert_eq!(attr.size, 64);
        assert_ne!(attr.flags & ATTR_FLAG_DISABLED, 0);
        assert_ne!(attr.flags & ATTR_FLAG_INHERIT, 0);
    }

    #[test]
    fn test_task_clock_counts_when_available() {
        // Containers and hardened kernels may forbid perf events entirely
        let selector: CounterSelector = "task-clock".parse().unwrap();
        let mut counter = match PerfCounter::open(&selector) {
            Ok(counter) => counter,
            Err(e) => {
                assert!(format!("{:#}", e).contains("perf_event_open failed"));
                return;
            }
        };

        counter.start().unwrap();
        let mut x = 0u64;
        for i in 0..5_000_000u64 {
            x = x.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(x);
        assert!(counter.read().unwrap() > 0);
        assert_eq!(counter.name(), "task-clock");
    }
}

//! NVMe completion status codes
//!
//! The driver returns the completion status field of a failed command as the
//! positive return value of the ioctl. Bits above the status code (phase, more,
//! do-not-retry) are ignored when naming the status.

use std::fmt;

/// NVMe completion status as returned by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NvmeStatus(pub u16);

impl NvmeStatus {
    pub const SUCCESS: NvmeStatus = NvmeStatus(0);

    /// Raw status value
    #[inline]
    pub fn code(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Symbolic name of the status code (type and code bits only)
    pub fn name(self) -> &'static str {
        match self.0 & 0x3ff {
            0x000 => "SUCCESS",
            0x001 => "INVALID_OPCODE",
            0x002 => "INVALID_FIELD",
            0x003 => "CMDID_CONFLICT",
            0x004 => "DATA_XFER_ERROR",
            0x005 => "POWER_LOSS",
            0x006 => "INTERNAL",
            0x007 => "ABORT_REQ",
            0x008 => "ABORT_QUEUE",
            0x009 => "FUSED_FAIL",
            0x00a => "FUSED_MISSING",
            0x00b => "INVALID_NS",
            0x00c => "CMD_SEQ_ERROR",
            0x080 => "LBA_RANGE",
            0x081 => "CAP_EXCEEDED",
            0x082 => "NS_NOT_READY",
            0x100 => "CQ_INVALID",
            0x101 => "QID_INVALID",
            0x102 => "QUEUE_SIZE",
            0x103 => "ABORT_LIMIT",
            0x104 => "ABORT_MISSING",
            0x105 => "ASYNC_LIMIT",
            0x106 => "FIRMWARE_SLOT",
            0x107 => "FIRMWARE_IMAGE",
            0x108 => "INVALID_VECTOR",
            0x109 => "INVALID_LOG_PAGE",
            0x10a => "INVALID_FORMAT",
            0x180 => "BAD_ATTRIBUTES",
            0x280 => "WRITE_FAULT",
            0x281 => "READ_ERROR",
            0x282 => "GUARD_CHECK",
            0x283 => "APPTAG_CHECK",
            0x284 => "REFTAG_CHECK",
            0x285 => "COMPARE_FAILED",
            0x286 => "ACCESS_DENIED",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for NvmeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:04x})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names() {
        assert_eq!(NvmeStatus(0x0).name(), "SUCCESS");
        assert_eq!(NvmeStatus(0x2).name(), "INVALID_FIELD");
        assert_eq!(NvmeStatus(0x80).name(), "LBA_RANGE");
        assert_eq!(NvmeStatus(0x286).name(), "ACCESS_DENIED");
        assert_eq!(NvmeStatus(0x3ff).name(), "Unknown");
    }

    #[test]
    fn test_status_ignores_dnr_bit() {
        // Do-not-retry bit set on top of LBA_RANGE
        let status = NvmeStatus(0x4080);
        assert_eq!(status.name(), "LBA_RANGE");
        assert_eq!(status.to_string(), "LBA_RANGE(4080)");
    }

    #[test]
    fn test_success() {
        assert!(NvmeStatus::SUCCESS.is_success());
        assert!(!NvmeStatus(1).is_success());
    }
}

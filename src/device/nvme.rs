//! NVMe device backend (Linux ioctl interface)
//!
//! Talks to an NVMe namespace through the kernel's passthrough ioctls:
//!
//! - `NVME_IOCTL_ID` to learn the namespace id
//! - `NVME_IOCTL_ADMIN_CMD` for Identify (CNS 0 namespace, CNS 1 controller)
//! - `NVME_IOCTL_SUBMIT_IO` for one read or write per call
//! - `NVME_IOCTL_IO_CMD` for commands without data (Flush)
//!
//! A patched driver additionally answers a capability probe and accepts a whole
//! array of read/write commands in one call (`NVME_IOCTL_SUBMIT_BATCH_IO`). The
//! probe result is memoized at open time; stock kernels reject the probe and the
//! backend stays in direct mode.
//!
//! # Requirements
//!
//! - Root or CAP_SYS_ADMIN (passthrough ioctls)
//! - A namespace block device (`/dev/nvme0n1`) or controller character device
//!
//! # Example
//!
//! ```no_run
//! use nvbench::device::nvme::NvmeDevice;
//! use nvbench::device::DeviceBackend;
//!
//! let device = NvmeDevice::open("/dev/nvme0n1")?;
//! let features = device.identify()?;
//! println!("{} blocks of {} bytes", features.capacity_blocks, features.block_size());
//! # Ok::<(), anyhow::Error>(())
//! ```

use super::{
    DeviceBackend, FeatureDescriptor, IoError, IoRequest, NvmeStatus, Opcode,
    FALLBACK_MAX_TRANSFER_BLOCKS, LBA_SHIFT_RANGE, MAX_TRANSFER_LIMIT,
};
use crate::Result;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::mem::size_of;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

// _IO('N', 0x40)
const NVME_IOCTL_ID: libc::c_ulong = 0x4E40;
// _IOWR('N', 0x41, struct nvme_admin_cmd)
const NVME_IOCTL_ADMIN_CMD: libc::c_ulong = 0xC048_4E41;
// _IOW('N', 0x42, struct nvme_user_io)
const NVME_IOCTL_SUBMIT_IO: libc::c_ulong = 0x4030_4E42;
// _IOWR('N', 0x43, struct nvme_passthru_cmd)
const NVME_IOCTL_IO_CMD: libc::c_ulong = 0xC048_4E43;

// Patched-driver extensions
// _IO('N', 0x50): returns 1 when batched submission is available
const NVME_IOCTL_SUPPORTS_CUSTOM_CMDS: libc::c_ulong = 0x4E50;
// _IOWR('N', 0x51, struct nvme_batch_user_io), sized by the fixed header only
const NVME_IOCTL_SUBMIT_BATCH_IO: libc::c_ulong = 0xC008_4E51;

const ADMIN_IDENTIFY: u8 = 0x06;
const CNS_NAMESPACE: u32 = 0;
const CNS_CONTROLLER: u32 = 1;
const IDENTIFY_PAGE_SIZE: usize = 4096;

/// `struct nvme_user_io`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct UserIo {
    opcode: u8,
    flags: u8,
    control: u16,
    nblocks: u16,
    rsvd: u16,
    metadata: u64,
    addr: u64,
    slba: u64,
    dsmgmt: u32,
    reftag: u32,
    apptag: u16,
    appmask: u16,
}

impl UserIo {
    fn from_request(request: &IoRequest) -> Self {
        Self {
            opcode: request.opcode.code(),
            // Zero-based on the wire
            nblocks: request.block_count.saturating_sub(1) as u16,
            addr: request.addr,
            slba: request.device_block,
            ..Self::default()
        }
    }
}

/// `struct nvme_passthru_cmd` / `struct nvme_admin_cmd`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PassthruCmd {
    opcode: u8,
    flags: u8,
    rsvd1: u16,
    nsid: u32,
    cdw2: u32,
    cdw3: u32,
    metadata: u64,
    addr: u64,
    metadata_len: u32,
    data_len: u32,
    cdw10: u32,
    cdw11: u32,
    cdw12: u32,
    cdw13: u32,
    cdw14: u32,
    cdw15: u32,
    timeout_ms: u32,
    result: u32,
}

/// Fixed part of `struct nvme_batch_user_io`
///
/// The driver reads `count` commands laid out inline right after this header
/// (`struct nvme_user_io cmds[]`), all in one allocation.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BatchHeader {
    count: u32,
    rsvd: u32,
}

/// Build the contiguous `{ header, cmds[count] }` block for one batch call
///
/// Backed by `u64` words so the header and every command stay 8-byte aligned.
pub(crate) fn encode_batch(requests: &[IoRequest]) -> Vec<u64> {
    const HEADER_WORDS: usize = size_of::<BatchHeader>() / 8;
    const IO_WORDS: usize = size_of::<UserIo>() / 8;

    let mut words = vec![0u64; HEADER_WORDS + requests.len() * IO_WORDS];
    let base = words.as_mut_ptr();
    let header = BatchHeader {
        count: requests.len() as u32,
        rsvd: 0,
    };
    // SAFETY: `words` holds the header plus one `UserIo` per request, and
    // every write lands on an 8-byte boundary inside it.
    unsafe {
        std::ptr::write(base as *mut BatchHeader, header);
        for (i, request) in requests.iter().enumerate() {
            let slot = base.add(HEADER_WORDS + i * IO_WORDS) as *mut UserIo;
            std::ptr::write(slot, UserIo::from_request(request));
        }
    }
    words
}

#[repr(C, align(4096))]
struct IdentifyPage([u8; IDENTIFY_PAGE_SIZE]);

/// NVMe namespace opened for passthrough commands
pub struct NvmeDevice {
    file: File,
    path: PathBuf,
    nsid: u32,
    batch: bool,
}

impl NvmeDevice {
    /// Open an NVMe device
    ///
    /// The device is opened read-only; passthrough ioctls do not need write
    /// access to the file. Paths that are neither block nor character devices
    /// are rejected before any ioctl is issued.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .with_context(|| format!("Failed to open device: {}", path.display()))?;

        let file_type = file
            .metadata()
            .with_context(|| format!("Failed to stat device: {}", path.display()))?
            .file_type();
        if !file_type.is_block_device() && !file_type.is_char_device() {
            anyhow::bail!("{} is not a block or character device", path.display());
        }

        let fd = file.as_raw_fd();
        let nsid = unsafe { libc::ioctl(fd, NVME_IOCTL_ID) };
        if nsid < 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context(format!(
                "ioctl(NVME_IOCTL_ID) failed: path={}",
                path.display()
            ));
        }

        let batch = unsafe { libc::ioctl(fd, NVME_IOCTL_SUPPORTS_CUSTOM_CMDS) } == 1;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            nsid: nsid as u32,
            batch,
        })
    }

    /// Namespace id reported by the driver
    pub fn nsid(&self) -> u32 {
        self.nsid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn identify_page(&self, cns: u32) -> std::result::Result<Box<IdentifyPage>, IoError> {
        let mut page = Box::new(IdentifyPage([0; IDENTIFY_PAGE_SIZE]));
        let mut cmd = PassthruCmd {
            opcode: ADMIN_IDENTIFY,
            nsid: self.nsid,
            addr: page.0.as_mut_ptr() as u64,
            data_len: IDENTIFY_PAGE_SIZE as u32,
            cdw10: cns,
            ..PassthruCmd::default()
        };
        let ret = unsafe { libc::ioctl(self.fd(), NVME_IOCTL_ADMIN_CMD, &mut cmd) };
        check_ioctl(ret)?;
        Ok(page)
    }
}

/// Map an ioctl return value to the error taxonomy
fn check_ioctl(ret: libc::c_int) -> std::result::Result<(), IoError> {
    match ret {
        0 => Ok(()),
        r if r < 0 => Err(IoError::SystemFailure(std::io::Error::last_os_error())),
        r => Err(IoError::DriverRejected {
            status: NvmeStatus(r as u16),
        }),
    }
}

/// Parse capacity and LBA shift from an Identify Namespace page
///
/// LBADS values outside 512 B..64 KiB (including 0 for an unused format slot)
/// are rejected; shifting by them would overflow or give a nonsense geometry.
pub(crate) fn parse_namespace(page: &[u8]) -> std::result::Result<(u64, u32), IoError> {
    let mut nsze = [0u8; 8];
    nsze.copy_from_slice(&page[0..8]);
    let capacity = u64::from_le_bytes(nsze);

    let flbas = (page[26] & 0x0f) as usize;
    // LBA format descriptors start at byte 128, 4 bytes each: ms(2) lbads(1) rp(1)
    let lba_shift = page[128 + flbas * 4 + 2] as u32;
    if !LBA_SHIFT_RANGE.contains(&lba_shift) {
        return Err(IoError::UnsupportedFormat { lba_shift });
    }

    Ok((capacity, lba_shift))
}

/// Parse serial, model and maximum transfer from an Identify Controller page
pub(crate) fn parse_controller(page: &[u8], lba_shift: u32) -> (String, String, u32) {
    let serial = ascii_field(&page[4..24]);
    let model = ascii_field(&page[24..64]);
    let max_blocks = max_transfer_blocks(page[77], lba_shift);
    (serial, model, max_blocks)
}

/// MDTS is a power of two in units of the minimum page size (4 KiB assumed)
pub(crate) fn max_transfer_blocks(mdts: u8, lba_shift: u32) -> u32 {
    if mdts == 0 {
        return MAX_TRANSFER_LIMIT;
    }
    let shift = (mdts as u32 + 12).saturating_sub(lba_shift);
    if shift >= 17 {
        return MAX_TRANSFER_LIMIT;
    }
    (1u32 << shift).min(MAX_TRANSFER_LIMIT)
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

impl DeviceBackend for NvmeDevice {
    fn identify(&self) -> std::result::Result<FeatureDescriptor, IoError> {
        let ns = self.identify_page(CNS_NAMESPACE)?;
        let (capacity_blocks, lba_shift) = parse_namespace(&ns.0)?;

        let (serial, model, max_transfer_blocks) = match self.identify_page(CNS_CONTROLLER) {
            Ok(ctrl) => parse_controller(&ctrl.0, lba_shift),
            Err(e) => {
                eprintln!(
                    "Warning: identify controller failed on {}: {} (assuming {} blocks per command)",
                    self.path.display(),
                    e,
                    FALLBACK_MAX_TRANSFER_BLOCKS
                );
                (String::new(), String::new(), FALLBACK_MAX_TRANSFER_BLOCKS)
            }
        };

        Ok(FeatureDescriptor {
            serial,
            model,
            capacity_blocks,
            lba_shift,
            max_transfer_blocks,
        })
    }

    fn supports_batch(&self) -> bool {
        self.batch
    }

    fn submit_io(&self, request: &IoRequest) -> std::result::Result<(), IoError> {
        let mut io = UserIo::from_request(request);
        let ret = unsafe { libc::ioctl(self.fd(), NVME_IOCTL_SUBMIT_IO, &mut io) };
        check_ioctl(ret)
    }

    fn submit_batch(
        &self,
        requests: &[IoRequest],
        statuses: &mut [u16],
    ) -> std::result::Result<(), IoError> {
        let mut batch = encode_batch(requests);
        let ret = unsafe { libc::ioctl(self.fd(), NVME_IOCTL_SUBMIT_BATCH_IO, batch.as_mut_ptr()) };
        // The driver reports one status for the whole call; a failed command
        // surfaces here as DriverRejected without an index.
        check_ioctl(ret)?;

        statuses.fill(NvmeStatus::SUCCESS.0);
        Ok(())
    }

    fn io_command(&self, opcode: Opcode) -> std::result::Result<(), IoError> {
        let mut cmd = PassthruCmd {
            opcode: opcode.code(),
            nsid: self.nsid,
            ..PassthruCmd::default()
        };
        let ret = unsafe { libc::ioctl(self.fd(), NVME_IOCTL_IO_CMD, &mut cmd) };
        check_ioctl(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: ioctl paths need root and a real NVMe device; only the wire layout
    // and the page parsers are covered here.

    #[test]
    fn test_struct_layouts() {
        assert_eq!(size_of::<UserIo>(), 48);
        assert_eq!(size_of::<PassthruCmd>(), 72);
        assert_eq!(size_of::<BatchHeader>(), 8);
    }

    #[test]
    fn test_batch_commands_follow_header_inline() {
        let requests: Vec<IoRequest> = (0..3)
            .map(|i| IoRequest {
                opcode: Opcode::Write,
                addr: 0x10_0000 + i * 0x1000,
                device_block: 100 + i,
                block_count: 8,
            })
            .collect();
        let words = encode_batch(&requests);
        assert_eq!(words.len() * 8, 8 + 3 * 48);

        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_ne_bytes()).collect();
        assert_eq!(u32::from_ne_bytes(bytes[0..4].try_into().unwrap()), 3);
        for i in 0..3u64 {
            let cmd = &bytes[8 + i as usize * 48..][..48];
            assert_eq!(cmd[0], Opcode::Write.code());
            assert_eq!(u16::from_ne_bytes([cmd[4], cmd[5]]), 7);
            assert_eq!(u64::from_ne_bytes(cmd[16..24].try_into().unwrap()), 0x10_0000 + i * 0x1000);
            assert_eq!(u64::from_ne_bytes(cmd[24..32].try_into().unwrap()), 100 + i);
        }

        assert_eq!(encode_batch(&[]).len(), 1);
    }

    #[test]
    fn test_ioctl_numbers_encode_struct_sizes() {
        assert_eq!((NVME_IOCTL_ADMIN_CMD >> 16) & 0x3fff, size_of::<PassthruCmd>() as libc::c_ulong);
        assert_eq!((NVME_IOCTL_IO_CMD >> 16) & 0x3fff, size_of::<PassthruCmd>() as libc::c_ulong);
        assert_eq!((NVME_IOCTL_SUBMIT_IO >> 16) & 0x3fff, size_of::<UserIo>() as libc::c_ulong);
        assert_eq!(
            (NVME_IOCTL_SUBMIT_BATCH_IO >> 16) & 0x3fff,
            size_of::<BatchHeader>() as libc::c_ulong
        );
    }

    #[test]
    fn test_user_io_block_count_is_zero_based() {
        let request = IoRequest {
            opcode: Opcode::Read,
            addr: 0x1000,
            device_block: 42,
            block_count: 8,
        };
        let io = UserIo::from_request(&request);
        assert_eq!(io.opcode, 0x02);
        assert_eq!(io.nblocks, 7);
        assert_eq!(io.slba, 42);
        assert_eq!(io.addr, 0x1000);
    }

    #[test]
    fn test_parse_namespace() {
        let mut page = vec![0u8; IDENTIFY_PAGE_SIZE];
        page[0..8].copy_from_slice(&1_000_000u64.to_le_bytes());
        page[26] = 1; // LBA format 1 in use
        page[128 + 2] = 9; // format 0: 512 bytes
        page[128 + 4 + 2] = 12; // format 1: 4096 bytes

        let (capacity, shift) = parse_namespace(&page).unwrap();
        assert_eq!(capacity, 1_000_000);
        assert_eq!(shift, 12);
    }

    #[test]
    fn test_parse_namespace_rejects_bad_lbads() {
        let mut page = vec![0u8; IDENTIFY_PAGE_SIZE];
        page[0..8].copy_from_slice(&1_000_000u64.to_le_bytes());
        for lbads in [0u8, 8, 17, 64] {
            page[128 + 2] = lbads;
            match parse_namespace(&page) {
                Err(IoError::UnsupportedFormat { lba_shift }) => assert_eq!(lba_shift, lbads as u32),
                other => panic!("LBADS {} accepted: {:?}", lbads, other),
            }
        }
        page[128 + 2] = 16;
        assert_eq!(parse_namespace(&page).unwrap(), (1_000_000, 16));
    }

    #[test]
    fn test_parse_controller() {
        let mut page = vec![0u8; IDENTIFY_PAGE_SIZE];
        page[4..24].copy_from_slice(b"S3EVNX0J123456      ");
        let model = b"Samsung SSD 960 EVO 250GB";
        page[24..24 + model.len()].copy_from_slice(model);
        for b in &mut page[24 + model.len()..64] {
            *b = b' ';
        }
        page[77] = 5;

        let (serial, model, max_blocks) = parse_controller(&page, 9);
        assert_eq!(serial, "S3EVNX0J123456");
        assert_eq!(model, "Samsung SSD 960 EVO 250GB");
        // 2^(5 + 12 - 9) = 256 blocks of 512 bytes = 128 KiB
        assert_eq!(max_blocks, 256);
    }

    #[test]
    fn test_max_transfer_blocks() {
        assert_eq!(max_transfer_blocks(0, 9), MAX_TRANSFER_LIMIT);
        assert_eq!(max_transfer_blocks(5, 12), 32);
        assert_eq!(max_transfer_blocks(1, 12), 2);
        assert_eq!(max_transfer_blocks(10, 9), 8192);
        assert_eq!(max_transfer_blocks(20, 9), MAX_TRANSFER_LIMIT);
    }

    #[test]
    fn test_open_rejects_regular_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = NvmeDevice::open(file.path()).err().unwrap();
        assert!(err.to_string().contains("not a block or character device"));
    }

    #[test]
    fn test_open_missing_path() {
        assert!(NvmeDevice::open("/nonexistent/nvme0n1").is_err());
    }
}

//! BCM2835 Family Direct-Register Backend
//!
//! [`PeripheralMap`] hands out typed views of the peripheral register
//! blocks. Each block is mapped the first time it is requested and the
//! mapping is kept for the life of the process.
//!
//! The actual mapping goes through a [`MemoryMapper`]: [`DevMem`] on a real
//! board, [`ScratchMemory`] when simulating or testing.

pub mod clock;
pub mod gpio;
pub mod pwm;

use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::ptr::{self, NonNull};

use common::{Error, Result};

use super::PlatformInfo;
use crate::hw::bcm2835::{Peripheral, PeripheralKind};

pub use clock::{ClockManager, ClockSource, ClockTarget};
pub use gpio::Bcm2835GpioProvider;
pub use pwm::Bcm2835PwmProvider;

/// Maps physical address ranges into the process.
pub trait MemoryMapper: Send + Sync {
    /// Map `len` bytes starting at the page-aligned physical address `phys`.
    fn map(&self, phys: u64, len: usize) -> Result<NonNull<u8>>;
}

/// Maps physical memory through a memory device node.
#[derive(Debug, Clone)]
pub struct DevMem {
    path: PathBuf,
}

impl DevMem {
    pub fn new() -> Self {
        Self::with_path("/dev/mem")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for DevMem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMapper for DevMem {
    fn map(&self, phys: u64, len: usize) -> Result<NonNull<u8>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC | libc::O_CLOEXEC)
            .open(&self.path)
            .map_err(|err| Error::Access(format!("{}: {err}", self.path.display())))?;

        // The descriptor is not needed once the mapping exists.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_LOCKED,
                file.as_raw_fd(),
                phys as libc::off_t,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::MemoryAccess(io::Error::last_os_error()));
        }
        NonNull::new(addr.cast()).ok_or(Error::MemoryAccess(io::Error::from(
            io::ErrorKind::AddrNotAvailable,
        )))
    }
}

/// Backs register blocks with zeroed process memory.
///
/// Writes are kept but nothing reacts to them, which is enough to observe
/// what a driver programs.
#[derive(Debug, Default)]
pub struct ScratchMemory {
    mapped: spin::Mutex<Vec<u64>>,
}

impl ScratchMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical addresses mapped so far, in request order.
    pub fn mappings(&self) -> Vec<u64> {
        self.mapped.lock().clone()
    }
}

impl MemoryMapper for ScratchMemory {
    fn map(&self, phys: u64, len: usize) -> Result<NonNull<u8>> {
        let words = vec![0u64; len.div_ceil(8)].into_boxed_slice();
        let block: &'static mut [u64] = Box::leak(words);
        self.mapped.lock().push(phys);
        NonNull::new(block.as_mut_ptr().cast()).ok_or(Error::NotSupported)
    }
}

impl<M: MemoryMapper> MemoryMapper for &'static M {
    fn map(&self, phys: u64, len: usize) -> Result<NonNull<u8>> {
        (**self).map(phys, len)
    }
}

/// Typed view of one mapped register block.
pub struct RegisterBlock<T> {
    ptr: NonNull<T>,
}

impl<T> RegisterBlock<T> {
    #[inline(always)]
    pub fn as_ptr(self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T> Clone for RegisterBlock<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RegisterBlock<T> {}

// SAFETY: the mapping is never released and every access is volatile.
unsafe impl<T> Send for RegisterBlock<T> {}
unsafe impl<T> Sync for RegisterBlock<T> {}

impl<T> fmt::Debug for RegisterBlock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegisterBlock").field(&self.ptr).finish()
    }
}

#[derive(Copy, Clone)]
struct Mapping(NonNull<u8>);

// SAFETY: see `RegisterBlock`.
unsafe impl Send for Mapping {}

/// Lazily mapped, process-lifetime register blocks.
pub struct PeripheralMap {
    info: PlatformInfo,
    mapper: Box<dyn MemoryMapper>,
    blocks: spin::Mutex<BTreeMap<(PeripheralKind, usize), Mapping>>,
}

impl fmt::Debug for PeripheralMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeripheralMap")
            .field("info", &self.info)
            .field("mapped", &self.blocks.lock().len())
            .finish()
    }
}

impl PeripheralMap {
    pub fn new(info: PlatformInfo, mapper: impl MemoryMapper + 'static) -> Self {
        Self {
            info,
            mapper: Box::new(mapper),
            blocks: spin::Mutex::new(BTreeMap::new()),
        }
    }

    /// The process-wide map over `/dev/mem`.
    pub fn system() -> &'static PeripheralMap {
        static SYSTEM: spin::Lazy<PeripheralMap> =
            spin::Lazy::new(|| PeripheralMap::new(PlatformInfo::system(), DevMem::new()));
        &SYSTEM
    }

    pub fn info(&self) -> PlatformInfo {
        self.info
    }

    /// Physical address of instance `index` of `kind`.
    pub fn physical_address(&self, kind: PeripheralKind, index: usize) -> u64 {
        u64::from(self.info.base()) | (kind.offset() + kind.stride() * index) as u64
    }

    /// Register block `T`, instance `index`.
    pub fn get<T: Peripheral>(&self, index: usize) -> Result<RegisterBlock<T>> {
        let kind = T::KIND;
        if index >= kind.instances() {
            return Err(Error::invalid_argument(
                "PeripheralMap::get",
                format!("index < {} for {kind:?}", kind.instances()),
                index,
            ));
        }

        let mut blocks = self.blocks.lock();
        let mapping = match blocks.get(&(kind, index)) {
            Some(mapping) => *mapping,
            None => {
                let phys = self.physical_address(kind, index);
                let page = page_size();
                let aligned = phys & !(page - 1);
                let lead = (phys - aligned) as usize;

                let base = self.mapper.map(aligned, lead + size_of::<T>())?;
                // SAFETY: `lead` is inside the range just mapped.
                let mapping = Mapping(unsafe { base.add(lead) });
                log::debug!("mapped {kind:?}[{index}] at {phys:#x}");
                blocks.insert((kind, index), mapping);
                mapping
            }
        };

        Ok(RegisterBlock {
            ptr: mapping.0.cast(),
        })
    }
}

fn page_size() -> u64 {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as u64,
        _ => 4096,
    }
}

#[cfg(test)]
pub(crate) fn scratch_map(info: PlatformInfo) -> &'static PeripheralMap {
    Box::leak(Box::new(PeripheralMap::new(info, ScratchMemory::new())))
}

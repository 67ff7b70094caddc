//! Operation region address spaces and the region-access callback
//!
//! Every datum moved through a region field ends up in exactly one call to
//! [`RegionHandler::access`]. Handlers are installed per address space in a
//! [`RegionHandlers`] registry; the interpreter never holds the namespace
//! lock while a handler runs, so handlers may block.

use crate::{AmlError, AmlResult};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Address space of an operation region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionSpace {
    /// System memory
    SystemMemory,
    /// Port I/O
    SystemIO,
    /// PCI configuration space
    PciConfig,
    /// Embedded controller
    EmbeddedControl,
    /// SMBus
    SMBus,
    /// CMOS RAM
    SystemCmos,
    /// PCI BAR target
    PciBarTarget,
    /// IPMI
    Ipmi,
    /// General purpose I/O
    GeneralPurposeIo,
    /// Generic serial bus
    GenericSerialBus,
    /// Platform communications channel
    Pcc,
    /// OEM-defined space (0x80..=0xFF)
    Oem(u8),
}

impl RegionSpace {
    /// Decode the RegionSpace byte of an OperationRegion
    pub fn from_byte(byte: u8) -> AmlResult<Self> {
        Ok(match byte {
            0x00 => RegionSpace::SystemMemory,
            0x01 => RegionSpace::SystemIO,
            0x02 => RegionSpace::PciConfig,
            0x03 => RegionSpace::EmbeddedControl,
            0x04 => RegionSpace::SMBus,
            0x05 => RegionSpace::SystemCmos,
            0x06 => RegionSpace::PciBarTarget,
            0x07 => RegionSpace::Ipmi,
            0x08 => RegionSpace::GeneralPurposeIo,
            0x09 => RegionSpace::GenericSerialBus,
            0x0A => RegionSpace::Pcc,
            0x80..=0xFF => RegionSpace::Oem(byte),
            _ => return Err(AmlError::BadParameter(format!("region space {:#x}", byte))),
        })
    }

    /// Encoded RegionSpace byte
    pub fn to_byte(self) -> u8 {
        match self {
            RegionSpace::SystemMemory => 0x00,
            RegionSpace::SystemIO => 0x01,
            RegionSpace::PciConfig => 0x02,
            RegionSpace::EmbeddedControl => 0x03,
            RegionSpace::SMBus => 0x04,
            RegionSpace::SystemCmos => 0x05,
            RegionSpace::PciBarTarget => 0x06,
            RegionSpace::Ipmi => 0x07,
            RegionSpace::GeneralPurposeIo => 0x08,
            RegionSpace::GenericSerialBus => 0x09,
            RegionSpace::Pcc => 0x0A,
            RegionSpace::Oem(byte) => byte,
        }
    }

    /// Widest access, in bytes, the space supports
    pub fn max_access_width(self) -> u32 {
        match self {
            RegionSpace::SystemIO => 4,
            RegionSpace::EmbeddedControl
            | RegionSpace::SMBus
            | RegionSpace::Pcc
            | RegionSpace::SystemCmos => 1,
            _ => 8,
        }
    }
}

/// Direction of a region access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessDirection {
    /// Handler fills `value`
    Read,
    /// Handler consumes `value`
    Write,
}

impl fmt::Display for AccessDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessDirection::Read => f.write_str("read"),
            AccessDirection::Write => f.write_str("write"),
        }
    }
}

/// Location of a PCI configuration region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PciLocation {
    /// PCI segment (`_SEG`)
    pub segment: u16,
    /// Bus number (`_BBN`)
    pub bus: u8,
    /// Device number (high word of `_ADR`)
    pub device: u8,
    /// Function number (low word of `_ADR`)
    pub function: u8,
}

impl PciLocation {
    /// Build from `_ADR`, `_BBN` and `_SEG` values
    pub fn from_acpi(adr: u64, bbn: u64, seg: u64) -> Self {
        Self {
            segment: seg as u16,
            bus: bbn as u8,
            device: (adr >> 16) as u8,
            function: adr as u8,
        }
    }

    /// Encode a configuration-space offset as a handler address
    ///
    /// ```text
    /// 63..48 segment | 47..40 bus | 39..32 device | 31..16 function | 15..0 offset
    /// ```
    pub fn address(&self, offset: u64) -> u64 {
        (u64::from(self.segment) << 48)
            | (u64::from(self.bus) << 40)
            | (u64::from(self.device) << 32)
            | (u64::from(self.function) << 16)
            | (offset & 0xFFFF)
    }
}

/// The region-access callback
///
/// Called once per access-width datum. On [`AccessDirection::Read`] the
/// handler stores the datum in `value`; on write it consumes `value`. Only
/// the low `bit_width` bits are meaningful in either direction.
pub trait RegionHandler: Send + Sync {
    /// Perform one access
    fn access(
        &self,
        space: RegionSpace,
        direction: AccessDirection,
        address: u64,
        bit_width: u32,
        value: &mut u64,
    ) -> AmlResult<()>;
}

/// Handler that reads zero and discards writes
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegionHandler;

impl RegionHandler for NoopRegionHandler {
    fn access(
        &self,
        space: RegionSpace,
        direction: AccessDirection,
        address: u64,
        bit_width: u32,
        value: &mut u64,
    ) -> AmlResult<()> {
        log::trace!(
            "noop {} {:?} {:#x} ({} bits)",
            direction,
            space,
            address,
            bit_width
        );
        if direction == AccessDirection::Read {
            *value = 0;
        }
        Ok(())
    }
}

/// Registry of installed handlers, keyed by space
pub struct RegionHandlers {
    handlers: DashMap<RegionSpace, Arc<dyn RegionHandler>>,
}

impl RegionHandlers {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Install a handler, returning the one it replaces
    pub fn install(
        &self,
        space: RegionSpace,
        handler: Arc<dyn RegionHandler>,
    ) -> Option<Arc<dyn RegionHandler>> {
        self.handlers.insert(space, handler)
    }

    /// Remove the handler for a space
    pub fn remove(&self, space: RegionSpace) -> Option<Arc<dyn RegionHandler>> {
        self.handlers.remove(&space).map(|(_, handler)| handler)
    }

    /// Handler for a space
    pub fn get(&self, space: RegionSpace) -> Option<Arc<dyn RegionHandler>> {
        self.handlers.get(&space).map(|entry| entry.value().clone())
    }

    /// Whether a handler is installed for a space
    pub fn contains(&self, space: RegionSpace) -> bool {
        self.handlers.contains_key(&space)
    }

    /// Route one access to the installed handler
    pub fn dispatch(
        &self,
        space: RegionSpace,
        direction: AccessDirection,
        address: u64,
        bit_width: u32,
        value: &mut u64,
    ) -> AmlResult<()> {
        // Clone the Arc so the map shard is unlocked while the handler runs.
        let handler = self.get(space).ok_or(AmlError::NoHandler(space))?;
        handler.access(space, direction, address, bit_width, value)
    }
}

impl Default for RegionHandlers {
    fn default() -> Self {
        Self::new()
    }
}

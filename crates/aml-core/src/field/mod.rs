//! Field descriptors
//!
//! A [`FieldDescriptor`] is the stable shape shared by the four field-bearing
//! object variants (buffer, region, bank and index fields). It locates the
//! field as a run of access-width datums:
//!
//! ```text
//!   base_byte_offset
//!   v
//!   |  datum 0   |  datum 1   |  datum 2   |
//!      ^start_bit_offset          ^start + bit_length
//! ```
//!
//! The transfer algorithms in [`transfer`] move bits between a flat byte
//! buffer and the datums through a [`transfer::DatumIo`] implementation.

pub mod transfer;

pub use transfer::{extract_from_field, insert_into_field, register_overflow, DatumIo};

use crate::{AmlError, AmlResult};

/// Access type of a field (bits 0-3 of the field flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessType {
    /// Smallest width that covers the field
    Any,
    /// 8-bit accesses
    Byte,
    /// 16-bit accesses
    Word,
    /// 32-bit accesses
    DWord,
    /// 64-bit accesses
    QWord,
    /// Byte accesses over a buffer-style protocol
    Buffer,
}

impl AccessType {
    /// Decode the low four bits of a flags byte
    pub fn from_bits(bits: u8) -> AmlResult<Self> {
        Ok(match bits & 0x0F {
            0 => AccessType::Any,
            1 => AccessType::Byte,
            2 => AccessType::Word,
            3 => AccessType::DWord,
            4 => AccessType::QWord,
            5 => AccessType::Buffer,
            other => return Err(AmlError::BadParameter(format!("access type {}", other))),
        })
    }

    /// Encoded value
    pub fn bits(self) -> u8 {
        match self {
            AccessType::Any => 0,
            AccessType::Byte => 1,
            AccessType::Word => 2,
            AccessType::DWord => 3,
            AccessType::QWord => 4,
            AccessType::Buffer => 5,
        }
    }

    /// Fixed width in bytes, `None` for `Any`
    pub fn width(self) -> Option<u32> {
        match self {
            AccessType::Any => None,
            AccessType::Byte | AccessType::Buffer => Some(1),
            AccessType::Word => Some(2),
            AccessType::DWord => Some(4),
            AccessType::QWord => Some(8),
        }
    }
}

/// Whether a field access takes the global lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockRule {
    /// No locking
    #[default]
    NoLock,
    /// Hold `\_GL_` around the access
    Lock,
}

/// Policy for bits outside of a partial-datum write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateRule {
    /// Read back the datum and keep the untouched bits
    #[default]
    Preserve,
    /// Untouched bits are written as ones
    WriteAsOnes,
    /// Untouched bits are written as zeros
    WriteAsZeros,
}

/// Encoded field flags byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldFlags(u8);

impl FieldFlags {
    const ACCESS_MASK: u8 = 0x0F;
    const LOCK_BIT: u8 = 0x10;
    const UPDATE_SHIFT: u8 = 5;
    const UPDATE_MASK: u8 = 0x60;

    /// Build from parts
    pub fn new(access: AccessType, lock: LockRule, update: UpdateRule) -> Self {
        let lock_bits = match lock {
            LockRule::NoLock => 0,
            LockRule::Lock => Self::LOCK_BIT,
        };
        let update_bits = match update {
            UpdateRule::Preserve => 0,
            UpdateRule::WriteAsOnes => 1,
            UpdateRule::WriteAsZeros => 2,
        };
        Self(access.bits() | lock_bits | (update_bits << Self::UPDATE_SHIFT))
    }

    /// Create from raw bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Access type
    pub fn access_type(&self) -> AmlResult<AccessType> {
        AccessType::from_bits(self.0 & Self::ACCESS_MASK)
    }

    /// Lock rule
    pub fn lock_rule(&self) -> LockRule {
        if self.0 & Self::LOCK_BIT != 0 {
            LockRule::Lock
        } else {
            LockRule::NoLock
        }
    }

    /// Update rule
    pub fn update_rule(&self) -> AmlResult<UpdateRule> {
        match (self.0 & Self::UPDATE_MASK) >> Self::UPDATE_SHIFT {
            0 => Ok(UpdateRule::Preserve),
            1 => Ok(UpdateRule::WriteAsOnes),
            2 => Ok(UpdateRule::WriteAsZeros),
            other => Err(AmlError::BadParameter(format!("update rule {}", other))),
        }
    }

    /// Same flags with a different access type (`AccessAs`)
    pub fn with_access_type(self, access: AccessType) -> Self {
        Self((self.0 & !Self::ACCESS_MASK) | access.bits())
    }
}

/// Location and access policy of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Declared length in bits
    pub bit_length: u32,
    /// Byte offset of the first datum, aligned to the access width
    pub base_byte_offset: u32,
    /// Bit offset of the field inside the first datum
    pub start_bit_offset: u32,
    /// Access width in bytes (1, 2, 4 or 8)
    pub access_width: u32,
    /// Update rule for partial writes
    pub update_rule: UpdateRule,
    /// Lock rule
    pub lock_rule: LockRule,
    /// The whole field lives in one datum
    pub single_datum: bool,
}

impl FieldDescriptor {
    /// Descriptor for a field of an operation region
    ///
    /// `max_width` is the widest access the region's space supports; it caps
    /// the width chosen for `AnyAcc` fields.
    pub fn new(
        bit_position: u32,
        bit_length: u32,
        flags: FieldFlags,
        max_width: u32,
    ) -> AmlResult<Self> {
        let access_width = match flags.access_type()?.width() {
            Some(width) => width,
            None => any_access_width(bit_position, bit_length, max_width),
        };
        Self::build(
            bit_position,
            bit_length,
            access_width,
            access_width,
            flags.update_rule()?,
            flags.lock_rule(),
        )
    }

    /// Descriptor for a buffer field
    ///
    /// Buffer fields may start on any byte, whatever their access width.
    pub fn for_buffer(bit_position: u32, bit_length: u32, access: AccessType) -> AmlResult<Self> {
        let access_width = access.width().unwrap_or(1);
        Self::build(
            bit_position,
            bit_length,
            access_width,
            1,
            UpdateRule::Preserve,
            LockRule::NoLock,
        )
    }

    fn build(
        bit_position: u32,
        bit_length: u32,
        access_width: u32,
        byte_alignment: u32,
        update_rule: UpdateRule,
        lock_rule: LockRule,
    ) -> AmlResult<Self> {
        if bit_length == 0 {
            return Err(AmlError::BadParameter("zero-length field".to_string()));
        }
        bit_position
            .checked_add(bit_length)
            .ok_or_else(|| AmlError::BadParameter("field extends past 4G bits".to_string()))?;

        let nearest_byte = bit_position / 8;
        let base_byte_offset = nearest_byte & !(byte_alignment - 1);
        let start_bit_offset = bit_position - base_byte_offset * 8;

        let mut descriptor = Self {
            bit_length,
            base_byte_offset,
            start_bit_offset,
            access_width,
            update_rule,
            lock_rule,
            single_datum: false,
        };
        descriptor.single_datum = descriptor.field_datum_count() == 1;
        Ok(descriptor)
    }

    /// Access width in bits
    #[inline]
    pub fn access_bits(&self) -> u32 {
        self.access_width * 8
    }

    /// Field length rounded up to whole bytes
    #[inline]
    pub fn byte_length(&self) -> usize {
        self.bit_length.div_ceil(8) as usize
    }

    /// Datums needed to hold the field value
    #[inline]
    pub fn datum_count(&self) -> u32 {
        self.bit_length.div_ceil(self.access_bits())
    }

    /// Datums the field touches in its backing store
    #[inline]
    pub fn field_datum_count(&self) -> u32 {
        (self.bit_length + self.start_bit_offset).div_ceil(self.access_bits())
    }

    /// One past the last byte any datum of the field touches
    pub fn end_byte_offset(&self) -> u64 {
        u64::from(self.base_byte_offset)
            + u64::from(self.field_datum_count()) * u64::from(self.access_width)
    }
}

/// Smallest natural width that covers the field inside one aligned datum
fn any_access_width(bit_position: u32, bit_length: u32, max_width: u32) -> u32 {
    let end = u64::from(bit_position) + u64::from(bit_length);
    for width in [1u32, 2, 4, 8] {
        if width > max_width {
            break;
        }
        let width_bits = u64::from(width) * 8;
        let datum_start = (u64::from(bit_position) / width_bits) * width_bits;
        if end <= datum_start + width_bits {
            return width;
        }
    }
    max_width.clamp(1, 8)
}

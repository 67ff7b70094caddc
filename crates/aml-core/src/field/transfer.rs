//! Bit-granular transfers between a byte buffer and field datums
//!
//! Both directions walk the field one access-width datum at a time. A value
//! that starts `start_bit_offset` bits into its first datum is reassembled by
//! merging each pair of adjacent datums; the last datum is masked to the
//! field's tail bits. Partial datum writes go through the update rule.

use super::{FieldDescriptor, UpdateRule};
use crate::{AmlError, AmlResult};

/// Per-datum access primitive
///
/// `datum_offset` is a byte offset relative to the descriptor's
/// `base_byte_offset`. Values carry the datum in their low
/// `access_width * 8` bits.
pub trait DatumIo {
    /// Read one datum
    fn read_datum(&mut self, datum_offset: u32) -> AmlResult<u64>;

    /// Write one datum
    fn write_datum(&mut self, datum_offset: u32, value: u64) -> AmlResult<()>;
}

/// Mask with the low `bits` bits set
#[inline]
fn low_bits(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

#[inline]
fn store_datum(buffer: &mut [u8], offset: usize, value: u64, width: usize) {
    if offset >= buffer.len() {
        return;
    }
    let count = width.min(buffer.len() - offset);
    buffer[offset..offset + count].copy_from_slice(&value.to_le_bytes()[..count]);
}

#[inline]
fn load_datum(buffer: &[u8], offset: usize, width: usize) -> u64 {
    let mut bytes = [0u8; 8];
    if offset < buffer.len() {
        let count = width.min(buffer.len() - offset);
        bytes[..count].copy_from_slice(&buffer[offset..offset + count]);
    }
    u64::from_le_bytes(bytes)
}

/// Read a whole field into `buffer`
///
/// `buffer` must hold at least [`FieldDescriptor::byte_length`] bytes; it is
/// zeroed before the transfer.
pub fn extract_from_field<D: DatumIo + ?Sized>(
    desc: &FieldDescriptor,
    io: &mut D,
    buffer: &mut [u8],
) -> AmlResult<()> {
    let required = desc.byte_length();
    if buffer.len() < required {
        return Err(AmlError::BufferOverflow {
            index: required as u64,
            length: buffer.len() as u64,
        });
    }
    buffer.fill(0);

    let width = desc.access_width as usize;
    let width_bits = desc.access_bits();
    let start = desc.start_bit_offset;

    // Field is exactly one aligned datum
    if start == 0 && desc.bit_length == width_bits {
        let raw = io.read_datum(0)?;
        store_datum(buffer, 0, raw, width);
        return Ok(());
    }

    let datum_count = desc.datum_count();
    let field_datum_count = desc.field_datum_count();

    let mut datum_offset = 0u32;
    let mut buffer_offset = 0usize;

    let mut raw = io.read_datum(datum_offset)?;
    let mut merged = raw >> start;

    for i in 1..field_datum_count {
        datum_offset += desc.access_width;
        raw = io.read_datum(datum_offset)?;

        if width_bits - start < 64 {
            merged |= raw << (width_bits - start);
        }
        if i == datum_count {
            break;
        }

        store_datum(buffer, buffer_offset, merged, width);
        buffer_offset += width;
        merged = raw >> start;
    }

    let tail_bits = desc.bit_length % width_bits;
    if tail_bits != 0 {
        merged &= low_bits(tail_bits);
    }
    store_datum(buffer, buffer_offset, merged, width);
    Ok(())
}

/// Write `data` into a whole field
///
/// Short input is zero-extended to the field length; excess input is
/// ignored.
pub fn insert_into_field<D: DatumIo + ?Sized>(
    desc: &FieldDescriptor,
    io: &mut D,
    data: &[u8],
) -> AmlResult<()> {
    let required = desc.byte_length();
    let padded;
    let buffer: &[u8] = if data.len() < required {
        let mut bytes = vec![0u8; required];
        bytes[..data.len()].copy_from_slice(data);
        padded = bytes;
        &padded
    } else {
        data
    };

    let width = desc.access_width as usize;
    let width_bits = desc.access_bits();
    let start = desc.start_bit_offset;

    let width_mask = low_bits(width_bits);
    let mut mask = width_mask & (u64::MAX << start);

    let datum_count = desc.datum_count();
    let field_datum_count = desc.field_datum_count();

    let mut datum_offset = 0u32;
    let mut buffer_offset = 0usize;

    let mut raw = load_datum(buffer, buffer_offset, width);
    let mut merged = raw << start;

    for i in 1..field_datum_count {
        merged &= mask;
        write_with_update_rule(desc, io, mask, merged, datum_offset)?;
        datum_offset += desc.access_width;

        // Bits of the previous input datum that spill into this one
        merged = if width_bits - start < 64 {
            raw >> (width_bits - start)
        } else {
            0
        };
        mask = width_mask;

        if i == datum_count {
            break;
        }

        buffer_offset += width;
        raw = load_datum(buffer, buffer_offset, width);
        merged |= raw << start;
    }

    let tail_bits = (desc.bit_length + start) % width_bits;
    if tail_bits != 0 {
        mask &= low_bits(tail_bits);
    }
    merged &= mask;
    write_with_update_rule(desc, io, mask, merged, datum_offset)
}

/// Write one datum, filling the bits outside `mask` per the update rule
pub fn write_with_update_rule<D: DatumIo + ?Sized>(
    desc: &FieldDescriptor,
    io: &mut D,
    mask: u64,
    value: u64,
    datum_offset: u32,
) -> AmlResult<()> {
    let width_bits = desc.access_bits();
    let mut merged = value;

    if mask != u64::MAX {
        match desc.update_rule {
            UpdateRule::Preserve => {
                // Only read back when some in-width bit lies outside the mask
                if (!mask << (64 - width_bits)) != 0 {
                    let current = io.read_datum(datum_offset)?;
                    merged |= current & !mask;
                }
            }
            UpdateRule::WriteAsOnes => merged |= !mask,
            UpdateRule::WriteAsZeros => merged &= mask,
        }
    }

    io.write_datum(datum_offset, merged & low_bits(width_bits))
}

/// Whether `value` is too large for a register described by `desc`
///
/// Registers at least as wide as the native integer can hold any value.
pub fn register_overflow(desc: &FieldDescriptor, value: u64, integer_bits: u32) -> bool {
    if desc.bit_length >= integer_bits || desc.bit_length >= 64 {
        return false;
    }
    value >= (1u64 << desc.bit_length)
}

//! Field reads and writes
//!
//! Each field kind supplies a [`DatumIo`] for the bit-packing engine:
//!
//! ```text
//! BufferField  -> bytes of the backing Buffer
//! RegionField  -> region handler, bounds-checked against the region length
//! BankField    -> write bank register, then RegionField path
//! IndexField   -> write index register, then read/write data register
//! ```
//!
//! Bank and index register sequences are serialized, and fields declared
//! with `Lock` hold the global lock for the whole access.

use super::Interpreter;
use crate::field::transfer::{extract_from_field, insert_into_field, register_overflow, DatumIo};
use crate::field::{FieldDescriptor, LockRule};
use crate::object::{BufferBinding, Object, ObjectHandle, ObjectType, RegionExtent};
use crate::region::{AccessDirection, RegionSpace};
use crate::sync::{SemaphoreGuard, WAIT_FOREVER};
use crate::walk::WalkList;
use crate::{AmlError, AmlResult};

/// Datums over the bytes of a Buffer object
struct BufferDatums<'a> {
    buffer: &'a ObjectHandle,
    desc: &'a FieldDescriptor,
}

impl BufferDatums<'_> {
    fn range(&self, bytes: &[u8], datum_offset: u32) -> AmlResult<(usize, usize)> {
        let start = self.desc.base_byte_offset as usize + datum_offset as usize;
        let end = (start + self.desc.access_width as usize).min(self.field_end());
        if end > bytes.len() || start > end {
            return Err(AmlError::BufferOverflow {
                index: end as u64,
                length: bytes.len() as u64,
            });
        }
        Ok((start, end))
    }

    /// One past the last byte the field covers
    fn field_end(&self) -> usize {
        let end_bit = self.desc.base_byte_offset as usize * 8
            + self.desc.start_bit_offset as usize
            + self.desc.bit_length as usize;
        end_bit.div_ceil(8)
    }
}

impl DatumIo for BufferDatums<'_> {
    fn read_datum(&mut self, datum_offset: u32) -> AmlResult<u64> {
        match &*self.buffer.read() {
            Object::Buffer(bytes) => {
                let (start, end) = self.range(bytes, datum_offset)?;
                let mut raw = [0u8; 8];
                raw[..end - start].copy_from_slice(&bytes[start..end]);
                Ok(u64::from_le_bytes(raw))
            }
            other => Err(AmlError::type_mismatch(ObjectType::Buffer, other.object_type())),
        }
    }

    fn write_datum(&mut self, datum_offset: u32, value: u64) -> AmlResult<()> {
        match &mut *self.buffer.write() {
            Object::Buffer(bytes) => {
                let (start, end) = self.range(bytes, datum_offset)?;
                bytes[start..end].copy_from_slice(&value.to_le_bytes()[..end - start]);
                Ok(())
            }
            other => Err(AmlError::type_mismatch(ObjectType::Buffer, other.object_type())),
        }
    }
}

/// Datums routed to a region handler
struct RegionDatums<'a> {
    interp: &'a Interpreter,
    space: RegionSpace,
    extent: RegionExtent,
    desc: &'a FieldDescriptor,
}

impl RegionDatums<'_> {
    fn access(
        &self,
        direction: AccessDirection,
        datum_offset: u32,
        value: &mut u64,
    ) -> AmlResult<()> {
        let offset = u64::from(self.desc.base_byte_offset) + u64::from(datum_offset);
        let width = self.desc.access_width;
        if offset + u64::from(width) > self.extent.length {
            return Err(AmlError::RegionLimit {
                offset,
                width,
                length: self.extent.length,
            });
        }

        let address = match self.extent.pci {
            Some(pci) => pci.address(self.extent.address.wrapping_add(offset)),
            None => self.extent.address.wrapping_add(offset),
        };
        log::trace!(
            "{} {:?} {:#x} width {} value {:#x}",
            direction,
            self.space,
            address,
            width * 8,
            value
        );
        self.interp
            .handlers
            .dispatch(self.space, direction, address, width * 8, value)
    }
}

impl DatumIo for RegionDatums<'_> {
    fn read_datum(&mut self, datum_offset: u32) -> AmlResult<u64> {
        let mut value = 0;
        self.access(AccessDirection::Read, datum_offset, &mut value)?;
        // Handlers may leave bits above the access width set
        let bits = self.desc.access_bits();
        let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
        Ok(value & mask)
    }

    fn write_datum(&mut self, datum_offset: u32, value: u64) -> AmlResult<()> {
        let mut value = value;
        self.access(AccessDirection::Write, datum_offset, &mut value)
    }
}

/// Datums reached through an index/data register pair
struct IndexDatums<'a> {
    interp: &'a Interpreter,
    list: &'a mut WalkList,
    index_register: &'a ObjectHandle,
    data_register: &'a ObjectHandle,
    desc: &'a FieldDescriptor,
}

impl IndexDatums<'_> {
    fn select(&mut self, datum_offset: u32) -> AmlResult<()> {
        let index = u64::from(self.desc.base_byte_offset) + u64::from(datum_offset);
        let bits = self.interp.integer_width().bits();
        if let Some(desc) = field_descriptor(&self.index_register.read()) {
            if register_overflow(&desc, index, bits) {
                return Err(AmlError::RegisterLimit {
                    value: index,
                    bits: desc.bit_length,
                });
            }
        }
        self.interp.write_field_unlocked(
            self.list,
            self.index_register,
            &Object::Integer(index),
        )
    }
}

impl DatumIo for IndexDatums<'_> {
    fn read_datum(&mut self, datum_offset: u32) -> AmlResult<u64> {
        self.select(datum_offset)?;
        let value = self.interp.read_field_unlocked(self.list, self.data_register)?;
        let value = value.read();
        crate::object::convert::to_integer(&value, self.interp.integer_width())
    }

    fn write_datum(&mut self, datum_offset: u32, value: u64) -> AmlResult<()> {
        self.select(datum_offset)?;
        self.interp
            .write_field_unlocked(self.list, self.data_register, &Object::Integer(value))
    }
}

fn field_descriptor(object: &Object) -> Option<FieldDescriptor> {
    match object {
        Object::RegionField(field) => Some(field.field),
        Object::BankField(field) => Some(field.field),
        Object::IndexField(field) => Some(field.field),
        Object::BufferField(field) => field.binding.ready().map(|binding| binding.field),
        _ => None,
    }
}

/// Snapshot of a field object taken before any I/O starts
enum FieldAccess {
    Buffer(BufferBinding),
    Region {
        region: ObjectHandle,
        desc: FieldDescriptor,
    },
    Bank {
        region: ObjectHandle,
        bank_register: ObjectHandle,
        bank_value: u64,
        desc: FieldDescriptor,
    },
    Index {
        index_register: ObjectHandle,
        data_register: ObjectHandle,
        desc: FieldDescriptor,
    },
}

impl FieldAccess {
    fn desc(&self) -> &FieldDescriptor {
        match self {
            FieldAccess::Buffer(binding) => &binding.field,
            FieldAccess::Region { desc, .. }
            | FieldAccess::Bank { desc, .. }
            | FieldAccess::Index { desc, .. } => desc,
        }
    }

    /// Whether the access runs a register select sequence
    fn sequenced(&self) -> bool {
        matches!(self, FieldAccess::Bank { .. } | FieldAccess::Index { .. })
    }
}

impl Interpreter {
    /// Read a field; small fields yield an Integer, wider ones a Buffer
    pub(crate) fn read_field(
        &self,
        list: &mut WalkList,
        field: &ObjectHandle,
    ) -> AmlResult<ObjectHandle> {
        let access = self.field_access(list, field)?;
        self.with_field_locks(list, &access, |interp, list| {
            interp.read_access(list, &access)
        })
    }

    /// Write `value` to a field
    ///
    /// Integers are written as their little-endian bytes, Strings and
    /// Buffers as their bytes; the value is truncated or zero-extended to the
    /// field length.
    pub(crate) fn write_field(
        &self,
        list: &mut WalkList,
        field: &ObjectHandle,
        value: &Object,
    ) -> AmlResult<()> {
        let access = self.field_access(list, field)?;
        let bytes = self.field_source_bytes(value)?;
        self.with_field_locks(list, &access, |interp, list| {
            interp.write_access(list, &access, &bytes)
        })
    }

    fn read_field_unlocked(
        &self,
        list: &mut WalkList,
        field: &ObjectHandle,
    ) -> AmlResult<ObjectHandle> {
        let access = self.field_access(list, field)?;
        self.read_access(list, &access)
    }

    fn write_field_unlocked(
        &self,
        list: &mut WalkList,
        field: &ObjectHandle,
        value: &Object,
    ) -> AmlResult<()> {
        let access = self.field_access(list, field)?;
        let bytes = self.field_source_bytes(value)?;
        self.write_access(list, &access, &bytes)
    }

    fn field_source_bytes(&self, value: &Object) -> AmlResult<Vec<u8>> {
        match value {
            Object::Integer(v) => Ok(v.to_le_bytes()[..self.integer_width().bytes()].to_vec()),
            Object::Buffer(bytes) => Ok(bytes.clone()),
            Object::String(text) => Ok(text.as_bytes().to_vec()),
            other => Err(AmlError::type_mismatch(ObjectType::Integer, other.object_type())),
        }
    }

    fn field_access(&self, list: &mut WalkList, field: &ObjectHandle) -> AmlResult<FieldAccess> {
        let access = match &*field.read() {
            Object::BufferField(buffer_field) => {
                buffer_field.binding.ready().cloned().map(FieldAccess::Buffer)
            }
            Object::RegionField(f) => Some(FieldAccess::Region {
                region: f.region.clone(),
                desc: f.field,
            }),
            Object::BankField(f) => Some(FieldAccess::Bank {
                region: f.region.clone(),
                bank_register: f.bank_register.clone(),
                bank_value: f.bank_value,
                desc: f.field,
            }),
            Object::IndexField(f) => Some(FieldAccess::Index {
                index_register: f.index_register.clone(),
                data_register: f.data_register.clone(),
                desc: f.field,
            }),
            other => {
                return Err(AmlError::type_mismatch(
                    ObjectType::RegionField,
                    other.object_type(),
                ))
            }
        };

        match access {
            Some(access) => Ok(access),
            None => Ok(FieldAccess::Buffer(self.force_buffer_field(list, field)?)),
        }
    }

    /// Run `body` under the global lock and the register sequence lock when
    /// the field asks for them
    fn with_field_locks<T>(
        &self,
        list: &mut WalkList,
        access: &FieldAccess,
        body: impl FnOnce(&Self, &mut WalkList) -> AmlResult<T>,
    ) -> AmlResult<T> {
        let locked = access.desc().lock_rule == LockRule::Lock;
        if locked {
            self.global_lock.acquire(list.id(), WAIT_FOREVER)?;
        }

        let result = if access.sequenced() {
            match SemaphoreGuard::acquire(&self.field_sequence, WAIT_FOREVER) {
                Ok(_sequence) => body(self, list),
                Err(err) => Err(err.into()),
            }
        } else {
            body(self, list)
        };

        if locked {
            self.global_lock.release(list.id())?;
        }
        result
    }

    fn read_access(&self, list: &mut WalkList, access: &FieldAccess) -> AmlResult<ObjectHandle> {
        let desc = *access.desc();
        let mut bytes = vec![0u8; desc.byte_length()];
        self.transfer(list, access, |io| extract_from_field(&desc, io, &mut bytes))?;

        let width = self.integer_width();
        if desc.byte_length() <= width.bytes() {
            let mut raw = [0u8; 8];
            raw[..bytes.len()].copy_from_slice(&bytes);
            Ok(ObjectHandle::integer(u64::from_le_bytes(raw)))
        } else {
            Ok(ObjectHandle::buffer(bytes))
        }
    }

    fn write_access(&self, list: &mut WalkList, access: &FieldAccess, bytes: &[u8]) -> AmlResult<()> {
        let desc = *access.desc();
        self.transfer(list, access, |io| insert_into_field(&desc, io, bytes))
    }

    /// Hand the right [`DatumIo`] for `access` to `op`
    fn transfer(
        &self,
        list: &mut WalkList,
        access: &FieldAccess,
        op: impl FnOnce(&mut dyn DatumIo) -> AmlResult<()>,
    ) -> AmlResult<()> {
        match access {
            FieldAccess::Buffer(binding) => {
                let mut io = BufferDatums {
                    buffer: &binding.buffer,
                    desc: &binding.field,
                };
                op(&mut io)
            }
            FieldAccess::Region { region, desc } => {
                let mut io = self.region_datums(list, region, desc)?;
                op(&mut io)
            }
            FieldAccess::Bank {
                region,
                bank_register,
                bank_value,
                desc,
            } => {
                let bits = self.integer_width().bits();
                if let Some(register) = field_descriptor(&bank_register.read()) {
                    if register_overflow(&register, *bank_value, bits) {
                        return Err(AmlError::RegisterLimit {
                            value: *bank_value,
                            bits: register.bit_length,
                        });
                    }
                }
                self.write_field_unlocked(list, bank_register, &Object::Integer(*bank_value))?;
                let mut io = self.region_datums(list, region, desc)?;
                op(&mut io)
            }
            FieldAccess::Index {
                index_register,
                data_register,
                desc,
            } => {
                let mut io = IndexDatums {
                    interp: self,
                    list,
                    index_register,
                    data_register,
                    desc,
                };
                op(&mut io)
            }
        }
    }

    fn region_datums<'a>(
        &'a self,
        list: &mut WalkList,
        region: &ObjectHandle,
        desc: &'a FieldDescriptor,
    ) -> AmlResult<RegionDatums<'a>> {
        let extent = self.force_region(list, region)?;
        let space = match &*region.read() {
            Object::Region(r) => r.space,
            other => return Err(AmlError::type_mismatch(ObjectType::Region, other.object_type())),
        };
        Ok(RegionDatums {
            interp: self,
            space,
            extent,
            desc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::AccessType;
    use crate::object::{BufferField, Deferred};
    use crate::options::InterpreterOptions;
    use crate::term::CreateFieldKind;

    fn buffer_field(buffer: &ObjectHandle, bit: u32, bits: u32, access: AccessType) -> ObjectHandle {
        ObjectHandle::new(Object::BufferField(BufferField {
            kind: CreateFieldKind::Field,
            binding: Deferred::Ready(BufferBinding {
                buffer: buffer.clone(),
                field: FieldDescriptor::for_buffer(bit, bits, access).unwrap(),
            }),
        }))
    }

    #[test]
    fn test_buffer_field_read_write() {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        let mut list = WalkList::new();
        let buffer = ObjectHandle::buffer(vec![0u8; 4]);
        let field = buffer_field(&buffer, 4, 12, AccessType::Byte);

        interp
            .write_field(&mut list, &field, &Object::Integer(0xABC))
            .unwrap();
        assert!(matches!(&*buffer.read(), Object::Buffer(b) if b == &[0xC0, 0xAB, 0, 0]));

        let value = interp.read_field(&mut list, &field).unwrap();
        assert_eq!(value.as_integer(), Some(0xABC));
    }

    #[test]
    fn test_wide_field_reads_as_buffer() {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        let mut list = WalkList::new();
        let buffer = ObjectHandle::buffer((0u8..16).collect::<Vec<_>>());
        let field = buffer_field(&buffer, 0, 96, AccessType::Byte);

        let value = interp.read_field(&mut list, &field).unwrap();
        assert!(matches!(&*value.read(), Object::Buffer(b) if b.len() == 12 && b[11] == 11));
    }

    #[test]
    fn test_buffer_field_past_end() {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        let mut list = WalkList::new();
        let buffer = ObjectHandle::buffer(vec![0u8; 2]);
        let field = buffer_field(&buffer, 8, 16, AccessType::Word);
        assert!(matches!(
            interp.read_field(&mut list, &field),
            Err(AmlError::BufferOverflow { .. })
        ));
    }

    #[test]
    fn test_field_source_bytes() {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        assert_eq!(
            interp.field_source_bytes(&Object::String("AB".into())).unwrap(),
            b"AB".to_vec()
        );
        assert_eq!(
            interp.field_source_bytes(&Object::Integer(1)).unwrap().len(),
            8
        );
        assert!(interp.field_source_bytes(&Object::Device).is_err());
    }
}

use aml_core::field::transfer::{extract_from_field, insert_into_field, DatumIo};
use aml_core::{AccessType, AmlResult, FieldDescriptor, FieldFlags, LockRule, UpdateRule};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Region backed by a plain byte vector
struct MemoryDatums {
    bytes: Vec<u8>,
    width: usize,
}

impl DatumIo for MemoryDatums {
    fn read_datum(&mut self, datum_offset: u32) -> AmlResult<u64> {
        let start = datum_offset as usize;
        let mut raw = [0u8; 8];
        raw[..self.width].copy_from_slice(&self.bytes[start..start + self.width]);
        Ok(u64::from_le_bytes(raw))
    }

    fn write_datum(&mut self, datum_offset: u32, value: u64) -> AmlResult<()> {
        let start = datum_offset as usize;
        self.bytes[start..start + self.width].copy_from_slice(&value.to_le_bytes()[..self.width]);
        Ok(())
    }
}

fn descriptor(access: AccessType, bit_position: u32, bit_length: u32) -> FieldDescriptor {
    let flags = FieldFlags::new(access, LockRule::NoLock, UpdateRule::Preserve);
    FieldDescriptor::new(bit_position, bit_length, flags, 8).unwrap()
}

fn memory(desc: &FieldDescriptor) -> MemoryDatums {
    let len = desc.datum_count() as usize * desc.access_width as usize + 8;
    MemoryDatums {
        bytes: (0..len).map(|i| i as u8).collect(),
        width: desc.access_width as usize,
    }
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");

    // Unaligned fields spanning many datums
    for (access, label) in [
        (AccessType::Byte, "byte"),
        (AccessType::DWord, "dword"),
        (AccessType::QWord, "qword"),
    ] {
        let desc = descriptor(access, 3, 1021);
        let mut io = memory(&desc);
        let mut out = vec![0u8; desc.byte_length()];
        group.throughput(Throughput::Bytes(desc.byte_length() as u64));
        group.bench_with_input(BenchmarkId::new("unaligned", label), &desc, |b, desc| {
            b.iter(|| {
                extract_from_field(black_box(desc), &mut io, &mut out).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for (update, label) in [
        (UpdateRule::Preserve, "preserve"),
        (UpdateRule::WriteAsZeros, "write_as_zeros"),
    ] {
        let flags = FieldFlags::new(AccessType::DWord, LockRule::NoLock, update);
        let desc = FieldDescriptor::new(5, 250, flags, 8).unwrap();
        let mut io = memory(&desc);
        let data = vec![0xA5u8; desc.byte_length()];
        group.bench_with_input(BenchmarkId::new("dword", label), &desc, |b, desc| {
            b.iter(|| {
                insert_into_field(black_box(desc), &mut io, black_box(&data)).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_extract, bench_insert);
criterion_main!(benches);

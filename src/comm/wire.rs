//! Little-endian wire records for the buffers exchanged between processes.
//!
//! A message is a [`WireHeader`] followed by `count` records of the kind named in the header.
//! Entity blocks carry their values column-major, so a received block has the same layout as
//! the dense matrix it was encoded from.
use super::CommError;
use bytemuck::{Pod, Zeroable};
use nalgebra::DMatrix;
use std::mem::size_of;

/// Bump when the layout or meaning of a record changes.
pub const WIRE_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum WireKind {
    EntityBlocks = 1,
    Triplets = 2,
    EntityOffsets = 3,
}

/// Narrows a length to the 32-bit field of a record.
fn length_field(value: usize, field: &str) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| panic!("{} {} does not fit in a 32-bit wire field", field, value))
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct WireHeader {
    version_le: u16,
    kind_le: u16,
    count_le: u32,
}

impl WireHeader {
    /// # Panics
    ///
    /// Panics if `count` does not fit in 32 bits.
    pub fn new(kind: WireKind, count: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: (kind as u16).to_le(),
            count_le: length_field(count, "record count").to_le(),
        }
    }

    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }

    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }

    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }
}

/// Precedes the `nrows * ncols` values of one entity block.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct WireBlockHeader {
    entity_le: u64,
    nrows_le: u32,
    ncols_le: u32,
}

impl WireBlockHeader {
    /// # Panics
    ///
    /// Panics if `nrows` or `ncols` does not fit in 32 bits.
    pub fn new(entity: usize, nrows: usize, ncols: usize) -> Self {
        Self {
            entity_le: (entity as u64).to_le(),
            nrows_le: length_field(nrows, "block row count").to_le(),
            ncols_le: length_field(ncols, "block column count").to_le(),
        }
    }

    pub fn entity(&self) -> usize {
        u64::from_le(self.entity_le) as usize
    }

    pub fn nrows(&self) -> usize {
        u32::from_le(self.nrows_le) as usize
    }

    pub fn ncols(&self) -> usize {
        u32::from_le(self.ncols_le) as usize
    }
}

/// One matrix entry addressed by global row and column.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct WireTriplet {
    row_le: u64,
    col_le: u64,
    value_bits_le: u64,
}

impl WireTriplet {
    pub fn new(row: usize, col: usize, value: f64) -> Self {
        Self {
            row_le: (row as u64).to_le(),
            col_le: (col as u64).to_le(),
            value_bits_le: value.to_bits().to_le(),
        }
    }

    pub fn row(&self) -> usize {
        u64::from_le(self.row_le) as usize
    }

    pub fn col(&self) -> usize {
        u64::from_le(self.col_le) as usize
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(u64::from_le(self.value_bits_le))
    }
}

/// The first global index assigned to the dofs of an entity by its owner.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct WireEntityOffset {
    entity_le: u64,
    first_le: u64,
}

impl WireEntityOffset {
    pub fn new(entity: usize, first: usize) -> Self {
        Self {
            entity_le: (entity as u64).to_le(),
            first_le: (first as u64).to_le(),
        }
    }

    pub fn entity(&self) -> usize {
        u64::from_le(self.entity_le) as usize
    }

    pub fn first(&self) -> usize {
        u64::from_le(self.first_le) as usize
    }
}

fn push_record<T: Pod>(buffer: &mut Vec<u8>, record: &T) {
    buffer.extend_from_slice(bytemuck::bytes_of(record));
}

/// Bounds-checked sequential reader over a received buffer.
struct Reader<'a> {
    peer: usize,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(peer: usize, bytes: &'a [u8]) -> Self {
        Self { peer, bytes, pos: 0 }
    }

    fn malformed(&self, reason: String) -> CommError {
        CommError::Malformed {
            peer: self.peer,
            reason,
        }
    }

    fn read<T: Pod>(&mut self) -> Result<T, CommError> {
        let end = self.pos + size_of::<T>();
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| {
            self.malformed(format!(
                "truncated buffer: need {} bytes at offset {}, have {}",
                size_of::<T>(),
                self.pos,
                self.bytes.len()
            ))
        })?;
        self.pos = end;
        Ok(bytemuck::pod_read_unaligned(slice))
    }

    fn expect_remaining(&self, num_bytes: usize) -> Result<(), CommError> {
        let remaining = self.bytes.len() - self.pos;
        if remaining < num_bytes {
            Err(self.malformed(format!("truncated buffer: need {} more bytes, have {}", num_bytes, remaining)))
        } else {
            Ok(())
        }
    }

    fn read_header(&mut self, expected: WireKind) -> Result<usize, CommError> {
        let header: WireHeader = self.read()?;
        if header.version() != WIRE_VERSION {
            return Err(self.malformed(format!("unsupported wire version {}", header.version())));
        }
        if header.kind() != expected as u16 {
            return Err(self.malformed(format!(
                "expected record kind {}, got {}",
                expected as u16,
                header.kind()
            )));
        }
        Ok(header.count())
    }

    fn finish(self) -> Result<(), CommError> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(self.malformed(format!("{} trailing bytes", self.bytes.len() - self.pos)))
        }
    }
}

/// Encodes entity blocks keyed by global entity id.
pub fn encode_entity_blocks<'a>(blocks: impl IntoIterator<Item = (usize, &'a DMatrix<f64>)>) -> Vec<u8> {
    let blocks: Vec<_> = blocks.into_iter().collect();
    let mut buffer = Vec::new();
    push_record(&mut buffer, &WireHeader::new(WireKind::EntityBlocks, blocks.len()));
    for (entity, block) in blocks {
        push_record(&mut buffer, &WireBlockHeader::new(entity, block.nrows(), block.ncols()));
        for value in block.iter() {
            push_record(&mut buffer, &value.to_bits().to_le());
        }
    }
    buffer
}

pub fn decode_entity_blocks(peer: usize, bytes: &[u8]) -> Result<Vec<(usize, DMatrix<f64>)>, CommError> {
    let mut reader = Reader::new(peer, bytes);
    let count = reader.read_header(WireKind::EntityBlocks)?;
    let mut blocks = Vec::new();
    for _ in 0..count {
        let header: WireBlockHeader = reader.read()?;
        let len = header.nrows().saturating_mul(header.ncols());
        reader.expect_remaining(len.saturating_mul(size_of::<u64>()))?;
        let values = (0..len)
            .map(|_| Ok(f64::from_bits(u64::from_le(reader.read::<u64>()?))))
            .collect::<Result<Vec<f64>, CommError>>()?;
        let block = DMatrix::from_column_slice(header.nrows(), header.ncols(), &values);
        blocks.push((header.entity(), block));
    }
    reader.finish()?;
    Ok(blocks)
}

pub fn encode_triplets(triplets: &[(usize, usize, f64)]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(size_of::<WireHeader>() + triplets.len() * size_of::<WireTriplet>());
    push_record(&mut buffer, &WireHeader::new(WireKind::Triplets, triplets.len()));
    for &(row, col, value) in triplets {
        push_record(&mut buffer, &WireTriplet::new(row, col, value));
    }
    buffer
}

pub fn decode_triplets(peer: usize, bytes: &[u8]) -> Result<Vec<(usize, usize, f64)>, CommError> {
    let mut reader = Reader::new(peer, bytes);
    let count = reader.read_header(WireKind::Triplets)?;
    reader.expect_remaining(count.saturating_mul(size_of::<WireTriplet>()))?;
    let triplets = (0..count)
        .map(|_| {
            let triplet: WireTriplet = reader.read()?;
            Ok((triplet.row(), triplet.col(), triplet.value()))
        })
        .collect::<Result<Vec<_>, CommError>>()?;
    reader.finish()?;
    Ok(triplets)
}

pub fn encode_entity_offsets(offsets: &[(usize, usize)]) -> Vec<u8> {
    let mut buffer = Vec::new();
    push_record(&mut buffer, &WireHeader::new(WireKind::EntityOffsets, offsets.len()));
    for &(entity, first) in offsets {
        push_record(&mut buffer, &WireEntityOffset::new(entity, first));
    }
    buffer
}

pub fn decode_entity_offsets(peer: usize, bytes: &[u8]) -> Result<Vec<(usize, usize)>, CommError> {
    let mut reader = Reader::new(peer, bytes);
    let count = reader.read_header(WireKind::EntityOffsets)?;
    reader.expect_remaining(count.saturating_mul(size_of::<WireEntityOffset>()))?;
    let offsets = (0..count)
        .map(|_| {
            let record: WireEntityOffset = reader.read()?;
            Ok((record.entity(), record.first()))
        })
        .collect::<Result<Vec<_>, CommError>>()?;
    reader.finish()?;
    Ok(offsets)
}

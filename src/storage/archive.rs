// In: src/storage/archive.rs

//! The archive container: several named fields in one file, each payload
//! zstd-compressed independently. Opening a field decompresses that whole
//! field once; there is no windowed path here, because the compressed
//! payload has no random access. That trade is the point of this backend
//! in the benchmark suite.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic(4) | version(2) | header_len(4) | header | payloads...
//! header   = field_count(2), then per field:
//!            name(u16-prefixed utf8) | dtype(1) | ndim(1) |
//!            dims(u64 x ndim) | raw_len(8) | compressed_len(8)
//! ```
//!
//! Fields are sorted by name at write time so the artifact is deterministic
//! for identical inputs, and payloads follow in header order.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use ndarray::{ArrayD, IxDyn};

use crate::error::MinibenchError;
use crate::kernels::zstd;
use crate::storage::{ensure_fits, open_file, slice_array, SliceSource};
use crate::traits::Element;
use crate::types::{ElementType, Shape, SliceSpec};
use crate::utils::{typed_slice_to_bytes, typed_vec_from_bytes};

//==================================================================================
// Format Constants
//==================================================================================

pub const ARCHIVE_MAGIC: &[u8; 4] = b"MBZA";
pub const ARCHIVE_FORMAT_VERSION: u16 = 1;
/// magic(4) + version(2) + header_len(4)
const FIXED_PREAMBLE_LEN: usize = 10;
/// A reasonable limit to prevent OOM from a malformed header length. (16MB)
const MAX_REASONABLE_HEADER_LEN: usize = 16 * 1024 * 1024;
const MAX_REASONABLE_NDIM: usize = 32;

//==================================================================================
// Public Structs
//==================================================================================

/// Metadata for one archived field, extracted without touching payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub dtype: ElementType,
    pub shape: Shape,
    pub raw_len: u64,
    pub compressed_len: u64,
    /// Absolute payload position in the file.
    pub offset_in_file: u64,
}

/// The parsed header of an archive file. Fields appear in on-disk
/// (name-sorted) order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveInfo {
    pub format_version: u16,
    pub fields: Vec<FieldInfo>,
}

impl ArchiveInfo {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

//==================================================================================
// Writer
//==================================================================================

/// Writes named arrays as one archive file, compressing each field payload.
pub fn write_archive<T, P>(
    path: P,
    fields: &[(&str, &ArrayD<T>)],
    level: i32,
) -> Result<(), MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if fields.is_empty() {
        return Err(MinibenchError::StorageFormat(
            "an archive needs at least one field".to_string(),
        ));
    }

    // Canonical field order for deterministic artifacts.
    let mut sorted: Vec<&(&str, &ArrayD<T>)> = fields.iter().collect();
    sorted.sort_by_key(|(name, _)| *name);
    for pair in sorted.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(MinibenchError::StorageFormat(format!(
                "duplicate field name '{}'",
                pair[0].0
            )));
        }
    }

    let mut header_buf: Vec<u8> = Vec::new();
    header_buf.extend_from_slice(&(sorted.len() as u16).to_le_bytes());
    let mut payloads: Vec<Vec<u8>> = Vec::with_capacity(sorted.len());

    for (name, array) in &sorted {
        let shape = Shape::new(array.shape().to_vec())?;
        if shape.ndim() > MAX_REASONABLE_NDIM {
            return Err(MinibenchError::InvalidShape(format!(
                "rank {} exceeds the format limit of {}",
                shape.ndim(),
                MAX_REASONABLE_NDIM
            )));
        }

        let canonical = array.as_standard_layout();
        let elements = canonical.as_slice().ok_or_else(|| {
            MinibenchError::InternalError("canonicalized array is not contiguous".to_string())
        })?;
        let raw = typed_slice_to_bytes(elements);
        let compressed = zstd::encode(raw, level)?;

        write_prefixed_name(&mut header_buf, name)?;
        header_buf.push(T::ELEMENT_TYPE.code());
        header_buf.push(shape.ndim() as u8);
        for &dim in shape.dims() {
            header_buf.extend_from_slice(&(dim as u64).to_le_bytes());
        }
        header_buf.extend_from_slice(&(raw.len() as u64).to_le_bytes());
        header_buf.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
        payloads.push(compressed);
    }

    let mut file = File::create(path)?;
    file.write_all(ARCHIVE_MAGIC)?;
    file.write_all(&ARCHIVE_FORMAT_VERSION.to_le_bytes())?;
    file.write_all(&(header_buf.len() as u32).to_le_bytes())?;
    file.write_all(&header_buf)?;
    for payload in &payloads {
        file.write_all(payload)?;
    }
    Ok(())
}

//==================================================================================
// Reader
//==================================================================================

/// Parses an archive header, resolving every field's shape and payload
/// position without reading any payload bytes.
pub fn peek_archive<P: AsRef<Path>>(path: P) -> Result<ArchiveInfo, MinibenchError> {
    let path = path.as_ref();
    let mut file = open_file(path)?;

    let mut preamble = [0u8; FIXED_PREAMBLE_LEN];
    file.read_exact(&mut preamble)
        .map_err(|e| open_failure(path, &format!("truncated preamble ({})", e)))?;
    if &preamble[0..4] != ARCHIVE_MAGIC {
        return Err(open_failure(path, "bad magic number"));
    }
    let version = u16::from_le_bytes([preamble[4], preamble[5]]);
    if version != ARCHIVE_FORMAT_VERSION {
        return Err(open_failure(
            path,
            &format!(
                "unsupported format version: expected {}, got {}",
                ARCHIVE_FORMAT_VERSION, version
            ),
        ));
    }
    let header_len =
        u32::from_le_bytes([preamble[6], preamble[7], preamble[8], preamble[9]]) as usize;
    if header_len > MAX_REASONABLE_HEADER_LEN {
        return Err(open_failure(
            path,
            &format!("implausible header length {}", header_len),
        ));
    }

    let mut header_bytes = vec![0u8; header_len];
    file.read_exact(&mut header_bytes)
        .map_err(|e| open_failure(path, &format!("truncated header ({})", e)))?;
    let mut cursor = Cursor::new(header_bytes.as_slice());

    let field_count = read_u16(&mut cursor, path)?;
    let payload_base = (FIXED_PREAMBLE_LEN + header_len) as u64;
    let mut next_offset = payload_base;
    let mut fields = Vec::with_capacity(field_count as usize);

    for _ in 0..field_count {
        let name = read_prefixed_name(&mut cursor, path)?;
        let mut tag = [0u8; 2];
        cursor
            .read_exact(&mut tag)
            .map_err(|e| open_failure(path, &format!("truncated field entry ({})", e)))?;
        let dtype =
            ElementType::from_code(tag[0]).map_err(|e| open_failure(path, &e.to_string()))?;
        let ndim = tag[1] as usize;
        if ndim == 0 || ndim > MAX_REASONABLE_NDIM {
            return Err(open_failure(path, &format!("implausible rank {}", ndim)));
        }

        let mut dims = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            dims.push(read_u64(&mut cursor, path)? as usize);
        }
        let shape = Shape::new(dims).map_err(|e| open_failure(path, &e.to_string()))?;

        let raw_len = read_u64(&mut cursor, path)?;
        let compressed_len = read_u64(&mut cursor, path)?;
        if raw_len != (shape.num_elements() * dtype.size_bytes()) as u64 {
            return Err(open_failure(
                path,
                &format!(
                    "field '{}' declares {} raw bytes but its shape {} implies {}",
                    name,
                    raw_len,
                    shape,
                    shape.num_elements() * dtype.size_bytes()
                ),
            ));
        }

        fields.push(FieldInfo {
            name,
            dtype,
            shape,
            raw_len,
            compressed_len,
            offset_in_file: next_offset,
        });
        next_offset += compressed_len;
    }

    // The declared payloads must exactly account for the rest of the file.
    let actual = file
        .metadata()
        .map_err(|e| open_failure(path, &e.to_string()))?
        .len();
    if actual != next_offset {
        return Err(open_failure(
            path,
            &format!(
                "payload length mismatch: header accounts for {} bytes, file has {}",
                next_offset, actual
            ),
        ));
    }

    Ok(ArchiveInfo {
        format_version: version,
        fields,
    })
}

/// Reads and decompresses one whole field.
pub fn read_archive_field<T, P>(path: P, field: &str) -> Result<ArrayD<T>, MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let info = peek_archive(path)?;
    let entry = info.field(field).ok_or_else(|| {
        open_failure(
            path,
            &format!("no field named '{}' (has: {:?})", field, {
                let names: Vec<&str> = info.field_names().collect();
                names
            }),
        )
    })?;
    if entry.dtype != T::ELEMENT_TYPE {
        return Err(MinibenchError::UnsupportedType(format!(
            "field '{}' holds {}, requested {}",
            field,
            entry.dtype,
            T::ELEMENT_TYPE
        )));
    }

    let mut file = open_file(path)?;
    file.seek(SeekFrom::Start(entry.offset_in_file))?;
    let mut compressed = vec![0u8; entry.compressed_len as usize];
    file.read_exact(&mut compressed)?;

    let raw = zstd::decode(&compressed, entry.raw_len as usize)?;
    let elements = typed_vec_from_bytes::<T>(&raw)?;
    ArrayD::from_shape_vec(IxDyn(entry.shape.dims()), elements)
        .map_err(|e| MinibenchError::InternalError(format!("payload assembly failed: {}", e)))
}

//==================================================================================
// ArchiveSource
//==================================================================================

/// One opened archive field, fully decompressed, serving window reads from
/// memory.
pub struct ArchiveSource<T: Element> {
    shape: Shape,
    array: ArrayD<T>,
}

impl<T: Element> ArchiveSource<T> {
    pub fn open<P: AsRef<Path>>(path: P, field: &str) -> Result<Self, MinibenchError> {
        let array = read_archive_field::<T, _>(path, field)?;
        let shape = Shape::new_unchecked(array.shape().to_vec());
        Ok(ArchiveSource { shape, array })
    }
}

impl<T: Element> SliceSource<T> for ArchiveSource<T> {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn read_slice(&mut self, spec: &SliceSpec) -> Result<ArrayD<T>, MinibenchError> {
        ensure_fits(spec, &self.shape)?;
        Ok(slice_array(&self.array, spec))
    }
}

//==================================================================================
// Private Helpers
//==================================================================================

fn open_failure(path: &Path, msg: &str) -> MinibenchError {
    MinibenchError::SourceUnavailable(format!("{}: {}", path.display(), msg))
}

fn write_prefixed_name(buf: &mut Vec<u8>, name: &str) -> Result<(), MinibenchError> {
    if name.is_empty() || name.len() > u16::MAX as usize {
        return Err(MinibenchError::StorageFormat(format!(
            "field name length {} is out of range",
            name.len()
        )));
    }
    buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    Ok(())
}

fn read_prefixed_name(cursor: &mut Cursor<&[u8]>, path: &Path) -> Result<String, MinibenchError> {
    let len = read_u16(cursor, path)? as usize;
    let mut name_buf = vec![0u8; len];
    cursor
        .read_exact(&mut name_buf)
        .map_err(|e| open_failure(path, &format!("truncated field name ({})", e)))?;
    String::from_utf8(name_buf).map_err(|e| open_failure(path, &e.to_string()))
}

fn read_u16(cursor: &mut Cursor<&[u8]>, path: &Path) -> Result<u16, MinibenchError> {
    let mut buf = [0u8; 2];
    cursor
        .read_exact(&mut buf)
        .map_err(|e| open_failure(path, &format!("truncated header ({})", e)))?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u64(cursor: &mut Cursor<&[u8]>, path: &Path) -> Result<u64, MinibenchError> {
    let mut buf = [0u8; 8];
    cursor
        .read_exact(&mut buf)
        .map_err(|e| open_failure(path, &format!("truncated header ({})", e)))?;
    Ok(u64::from_le_bytes(buf))
}

//==================================================================================
// Unit Tests
//==================================================================================

//! NumPy `.npy` (format version 1.0) reader/writer for 2-D `f64` arrays.
//!
//! Layout: `\x93NUMPY`, major/minor version bytes, little-endian `u16` header
//! length, an ASCII dict header padded with spaces to a 64-byte boundary and
//! terminated by `\n`, then the raw little-endian `f8` data in C order.

use crate::error::MlError;
use ndarray::Array2;
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const PREAMBLE_LEN: usize = MAGIC.len() + 2 + 2;
const ALIGN: usize = 64;

/// Encode `array` as `.npy` bytes.
pub fn encode(array: &Array2<f64>) -> Vec<u8> {
    let (rows, cols) = array.dim();
    let mut header =
        format!("{{'descr': '<f8', 'fortran_order': False, 'shape': ({rows}, {cols}), }}");
    // Pad so that preamble + header (including the trailing newline) is aligned.
    let unpadded = PREAMBLE_LEN + header.len() + 1;
    let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(PREAMBLE_LEN + header.len() + rows * cols * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    // `iter()` walks in logical (row-major) order regardless of memory layout.
    for value in array.iter() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode `.npy` bytes holding a 2-D little-endian `f8` C-order array.
pub fn decode(bytes: &[u8]) -> Result<Array2<f64>, MlError> {
    if bytes.len() < PREAMBLE_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(MlError::ArrayFormat("missing NPY magic string".into()));
    }
    let (major, minor) = (bytes[6], bytes[7]);
    if major != 1 {
        return Err(MlError::ArrayFormat(format!(
            "unsupported NPY version {major}.{minor}"
        )));
    }
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let data_start = PREAMBLE_LEN + header_len;
    if bytes.len() < data_start {
        return Err(MlError::ArrayFormat("truncated NPY header".into()));
    }
    let header = std::str::from_utf8(&bytes[PREAMBLE_LEN..data_start])
        .map_err(|_| MlError::ArrayFormat("NPY header is not ASCII".into()))?;

    if !header.contains("'descr': '<f8'") {
        return Err(MlError::ArrayFormat(format!(
            "only little-endian f8 arrays are supported, header: {}",
            header.trim()
        )));
    }
    if header.contains("'fortran_order': True") {
        return Err(MlError::ArrayFormat("Fortran-ordered arrays are not supported".into()));
    }
    let (rows, cols) = parse_shape(header)?;

    let data = &bytes[data_start..];
    let expected = rows * cols * 8;
    if data.len() != expected {
        return Err(MlError::ArrayFormat(format!(
            "expected {expected} data bytes for shape ({rows}, {cols}), found {}",
            data.len()
        )));
    }
    let values: Vec<f64> = data
        .chunks_exact(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            f64::from_le_bytes(buf)
        })
        .collect();
    Ok(Array2::from_shape_vec((rows, cols), values)?)
}

fn parse_shape(header: &str) -> Result<(usize, usize), MlError> {
    let after = header
        .split_once("'shape':")
        .map(|(_, rest)| rest)
        .ok_or_else(|| MlError::ArrayFormat("NPY header has no shape".into()))?;
    let inner = after
        .trim_start()
        .strip_prefix('(')
        .and_then(|s| s.split_once(')'))
        .map(|(dims, _)| dims)
        .ok_or_else(|| MlError::ArrayFormat("malformed NPY shape".into()))?;
    let dims = inner
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            d.parse::<usize>()
                .map_err(|_| MlError::ArrayFormat(format!("bad NPY dimension '{d}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match dims.as_slice() {
        [rows, cols] => Ok((*rows, *cols)),
        other => Err(MlError::ArrayFormat(format!(
            "expected a 2-D array, found {} dimension(s)",
            other.len()
        ))),
    }
}

pub fn write_npy(path: &Path, array: &Array2<f64>) -> Result<(), MlError> {
    crate::persistence::atomic_write(path, &encode(array))?;
    Ok(())
}

pub fn read_npy(path: &Path) -> Result<Array2<f64>, MlError> {
    decode(&std::fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_header_is_aligned() {
        let bytes = encode(&array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(&bytes[..6], MAGIC);
        assert_eq!(bytes[6], 1);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((PREAMBLE_LEN + header_len) % 64, 0);
        assert_eq!(bytes[PREAMBLE_LEN + header_len - 1], b'\n');
        assert_eq!(bytes.len(), PREAMBLE_LEN + header_len + 4 * 8);
    }

    #[test]
    fn test_file_roundtrip_preserves_nan_and_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.npy");
        let a = array![[1.5, f64::NAN, -3.0], [0.0, 7.25, 1e300]];
        write_npy(&path, &a).unwrap();
        let b = read_npy(&path).unwrap();
        assert_eq!(b.dim(), (2, 3));
        assert_eq!(b[[0, 0]], 1.5);
        assert!(b[[0, 1]].is_nan());
        assert_eq!(b[[1, 2]], 1e300);
    }

    #[test]
    fn test_transposed_view_is_written_in_logical_order() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let t = a.t().to_owned();
        let back = decode(&encode(&t)).unwrap();
        assert_eq!(back, t);
        assert_eq!(back[[0, 1]], 3.0);
    }

    #[test]
    fn test_rejects_other_dtypes() {
        let mut bytes = encode(&array![[1.0]]);
        let pos = bytes.windows(3).position(|w| w == b"<f8").unwrap();
        bytes[pos + 1] = b'i';
        assert!(matches!(decode(&bytes), Err(MlError::ArrayFormat(_))));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let mut bytes = encode(&array![[1.0, 2.0]]);
        bytes.pop();
        assert!(decode(&bytes).is_err());
    }
}

// Tuple packing for raw segments
//
// Small-alphabet codes are packed several per byte before zstd. The last
// byte is a marker: high nibble = values per byte, low nibble = number of
// values in the trailing (partial) tuple.

use agcx_common::{AgcError, Result};

/// Pack codes into tuples sized by the largest code present
pub fn bytes_to_tuples(bytes: &[u8]) -> Vec<u8> {
    let max_elem = match bytes.iter().max() {
        Some(&m) => m,
        None => return vec![0x10],
    };

    if max_elem < 4 {
        pack_tuples::<4, 4>(bytes)
    } else if max_elem < 6 {
        pack_tuples::<3, 6>(bytes)
    } else if max_elem < 16 {
        pack_tuples::<2, 16>(bytes)
    } else {
        let mut result = Vec::with_capacity(bytes.len() + 1);
        result.extend_from_slice(bytes);
        result.push(0x10);
        result
    }
}

/// Unpack tuples back to codes
pub fn tuples_to_bytes(tuples: &[u8]) -> Result<Vec<u8>> {
    let (&marker, body) = match tuples.split_last() {
        Some(split) => split,
        None => return Ok(Vec::new()),
    };
    let no_bytes = (marker >> 4) as usize;
    let trailing = (marker & 0xf) as usize;

    if no_bytes == 1 {
        return Ok(body.to_vec());
    }
    if body.is_empty() || trailing >= no_bytes.max(1) {
        return Err(AgcError::corrupted(format!(
            "bad tuple marker {marker:#04x} for {} packed bytes",
            body.len()
        )));
    }

    let output_size = (body.len() - 1) * no_bytes + trailing;
    let mut result = vec![0u8; output_size];

    match no_bytes {
        2 => unpack_tuples::<2, 16>(body, &mut result),
        3 => unpack_tuples::<3, 6>(body, &mut result),
        4 => unpack_tuples::<4, 4>(body, &mut result),
        _ => {
            return Err(AgcError::corrupted(format!(
                "unsupported tuple width {no_bytes}"
            )))
        }
    }

    Ok(result)
}

fn pack_tuples<const N: usize, const MAX: u8>(bytes: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(bytes.len() / N + 2);

    let mut chunks = bytes.chunks_exact(N);
    for chunk in &mut chunks {
        let c = chunk
            .iter()
            .fold(0u32, |acc, &b| acc * MAX as u32 + b as u32);
        result.push(c as u8);
    }

    // Trailing tuple is always present, even when empty
    let c = chunks
        .remainder()
        .iter()
        .fold(0u32, |acc, &b| acc * MAX as u32 + b as u32);
    result.push(c as u8);

    result.push(((N as u8) << 4) | ((bytes.len() % N) as u8));
    result
}

fn unpack_tuples<const N: usize, const MAX: u8>(tuples: &[u8], output: &mut [u8]) {
    let output_size = output.len();
    let mut i = 0;
    let mut j = 0;

    while j + N <= output_size {
        let mut c = tuples[i] as u32;
        for k in (0..N).rev() {
            output[j + k] = (c % MAX as u32) as u8;
            c /= MAX as u32;
        }
        i += 1;
        j += N;
    }

    let n = output_size % N;
    if n > 0 {
        let mut c = tuples[i] as u32;
        for k in (0..n).rev() {
            output[j + k] = (c % MAX as u32) as u8;
            c /= MAX as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_acgt() {
        let dna = vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1];
        let packed = bytes_to_tuples(&dna);
        // 2 full tuples + trailing + marker
        assert_eq!(packed.len(), 4);
        assert_eq!(*packed.last().unwrap(), 0x42);
        assert_eq!(tuples_to_bytes(&packed).unwrap(), dna);
    }

    #[test]
    fn test_width_follows_max_code() {
        let with_n = vec![0, 1, 2, 3, 4, 1, 2, 3];
        assert_eq!(*bytes_to_tuples(&with_n).last().unwrap() >> 4, 3);
        assert_eq!(tuples_to_bytes(&bytes_to_tuples(&with_n)).unwrap(), with_n);

        // 6 and above no longer fit three per byte
        let iupac = vec![0, 1, 2, 3, 4, 5, 6, 15, 0, 1];
        assert_eq!(*bytes_to_tuples(&iupac).last().unwrap() >> 4, 2);
        assert_eq!(tuples_to_bytes(&bytes_to_tuples(&iupac)).unwrap(), iupac);
    }

    #[test]
    fn test_exact_multiple_has_empty_trailing_tuple() {
        let dna = vec![3u8; 8];
        let packed = bytes_to_tuples(&dna);
        assert_eq!(packed.len(), 4);
        assert_eq!(tuples_to_bytes(&packed).unwrap(), dna);
    }

    #[test]
    fn test_empty() {
        let packed = bytes_to_tuples(&[]);
        assert_eq!(packed, vec![0x10]);
        assert!(tuples_to_bytes(&packed).unwrap().is_empty());
        assert!(tuples_to_bytes(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_unpacked_passthrough() {
        let data = vec![16, 20, 100, 200];
        let packed = bytes_to_tuples(&data);
        assert_eq!(packed.len(), data.len() + 1);
        assert_eq!(tuples_to_bytes(&packed).unwrap(), data);
    }

    #[test]
    fn test_bad_marker_is_corruption() {
        assert!(tuples_to_bytes(&[0x12, 0x75]).is_err());
        assert!(tuples_to_bytes(&[0x44]).is_err());
        assert!(tuples_to_bytes(&[0x00, 0x00]).is_err());
    }
}

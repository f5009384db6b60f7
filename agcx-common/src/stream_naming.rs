// Stream names inside an agcx container

pub const STREAM_FILE_TYPE_INFO: &str = "file_type_info";
pub const STREAM_PARAMS: &str = "params";
pub const STREAM_COLLECTION_SAMPLES: &str = "collection-samples";
pub const STREAM_COLLECTION_CONTIGS: &str = "collection-contigs";

/// Convert integer to compact base64 (least significant digit first)
/// Digits: 0-9, A-Z, a-z, _, #
pub fn int_to_base64(mut n: u32) -> String {
    const DIGITS: &[u8; 64] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_#";

    let mut result = String::new();
    loop {
        result.push(DIGITS[(n & 0x3f) as usize] as char);
        n >>= 6;
        if n == 0 {
            break;
        }
    }
    result
}

/// Stream holding the raw segments of contig `id`
pub fn contig_raw_stream(id: u32) -> String {
    format!("x{}r", int_to_base64(id))
}

/// Stream holding the edit-script chunks of contig `id`
pub fn contig_delta_stream(id: u32) -> String {
    format!("x{}d", int_to_base64(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_to_base64() {
        assert_eq!(int_to_base64(0), "0");
        assert_eq!(int_to_base64(9), "9");
        assert_eq!(int_to_base64(10), "A");
        assert_eq!(int_to_base64(36), "a");
        assert_eq!(int_to_base64(62), "_");
        assert_eq!(int_to_base64(63), "#");
        assert_eq!(int_to_base64(64), "01");
        assert_eq!(int_to_base64(65), "11");
    }

    #[test]
    fn test_contig_streams() {
        assert_eq!(contig_raw_stream(0), "x0r");
        assert_eq!(contig_delta_stream(10), "xAd");
        assert_ne!(contig_raw_stream(64), contig_raw_stream(1));
    }
}

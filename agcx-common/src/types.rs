// Core types, nucleotide codes and version constants

/// Producer version
pub const AGCX_VER_MAJOR: u32 = 0;
pub const AGCX_VER_MINOR: u32 = 1;
pub const AGCX_VER_BUILD: &str = "20261016.1";

/// Archive file format version; a reader refuses a different major version
pub const AGCX_FILE_MAJOR: u32 = 1;
pub const AGCX_FILE_MINOR: u32 = 0;

/// Full version string
pub fn agcx_version() -> String {
    format!(
        "agcx (assembled genomes archive) v. {}.{} [build {}]",
        AGCX_VER_MAJOR, AGCX_VER_MINOR, AGCX_VER_BUILD
    )
}

/// A contig held as nucleotide codes (A=0, C=1, G=2, T=3, N=4, ...)
pub type Contig = Vec<u8>;

/// A compressed block as stored in an archive part
pub type PackedBlock = Vec<u8>;

/// Code of the unknown base `N`
pub const N_CODE: u8 = 4;

/// Number of distinct nucleotide codes (IUPAC alphabet plus U)
pub const NO_CODES: u8 = 16;

/// Code -> upper-case ASCII
pub const CODE_TO_ASCII: [u8; NO_CODES as usize] = *b"ACGTNRYSWKMBDHVU";

/// ASCII letter -> code, 0xFF for bytes that are not sequence letters
const fn build_ascii_to_code() -> [u8; 256] {
    let mut table = [0xFFu8; 256];
    let mut i = 0;
    while i < CODE_TO_ASCII.len() {
        let c = CODE_TO_ASCII[i];
        table[c as usize] = i as u8;
        table[(c + 32) as usize] = i as u8;
        i += 1;
    }
    table
}

static ASCII_TO_CODE: [u8; 256] = build_ascii_to_code();

/// Convert one FASTA byte to a code
///
/// Letters outside the alphabet become `N`; non-letters return `None`
/// so that callers can drop line breaks and whitespace.
#[inline]
pub fn encode_base(c: u8) -> Option<u8> {
    match ASCII_TO_CODE[c as usize] {
        0xFF if c.is_ascii_alphabetic() => Some(N_CODE),
        0xFF => None,
        code => Some(code),
    }
}

/// Convert one code to upper-case ASCII
#[inline]
pub fn decode_base(code: u8) -> u8 {
    CODE_TO_ASCII
        .get(code as usize)
        .copied()
        .unwrap_or(b'N')
}

/// Convert a run of codes to an ASCII string
pub fn codes_to_string(codes: &[u8]) -> String {
    codes.iter().map(|&c| decode_base(c) as char).collect()
}

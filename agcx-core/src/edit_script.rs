// Edit scripts: a target contig described against a reference contig
//
// Scripts are split into chunks at every `segment_size` target boundary so
// that any chunk can be decoded and applied on its own.

use agcx_common::{AgcError, Contig, Result, N_CODE};

/// One step of an edit script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Copy `len` reference bases starting at `ref_pos`
    Match { ref_pos: u64, len: u64 },
    /// Insert these codes
    Literal(Vec<u8>),
    /// Insert `len` copies of `N`
    NRun(u64),
}

impl EditOp {
    /// Number of target bases this op produces
    pub fn target_len(&self) -> u64 {
        match self {
            EditOp::Match { len, .. } => *len,
            EditOp::Literal(codes) => codes.len() as u64,
            EditOp::NRun(len) => *len,
        }
    }

    /// Split into the first `at` target bases and the rest
    fn split_at(&self, at: u64) -> (EditOp, EditOp) {
        match self {
            EditOp::Match { ref_pos, len } => (
                EditOp::Match { ref_pos: *ref_pos, len: at },
                EditOp::Match { ref_pos: ref_pos + at, len: len - at },
            ),
            EditOp::Literal(codes) => {
                let (head, tail) = codes.split_at(at as usize);
                (EditOp::Literal(head.to_vec()), EditOp::Literal(tail.to_vec()))
            }
            EditOp::NRun(len) => (EditOp::NRun(at), EditOp::NRun(len - at)),
        }
    }
}

/// Total number of target bases produced by `ops`
pub fn target_len(ops: &[EditOp]) -> u64 {
    ops.iter().map(EditOp::target_len).sum()
}

/// Random access to reference bases
pub trait ReferenceSource {
    /// Length of the reference contig
    fn ref_len(&self) -> u64;

    /// Append reference bases `[start, end)` to `out`
    fn fetch(&self, start: u64, end: u64, out: &mut Vec<u8>) -> Result<()>;
}

impl ReferenceSource for [u8] {
    fn ref_len(&self) -> u64 {
        self.len() as u64
    }

    fn fetch(&self, start: u64, end: u64, out: &mut Vec<u8>) -> Result<()> {
        let slice = self.get(start as usize..end as usize).ok_or_else(|| {
            AgcError::corrupted(format!(
                "reference range {start}..{end} outside contig of length {}",
                self.len()
            ))
        })?;
        out.extend_from_slice(slice);
        Ok(())
    }
}

/// Apply a whole script to a reference
pub fn reconstruct(reference: &[u8], ops: &[EditOp]) -> Result<Contig> {
    let total = target_len(ops);
    let mut out = Vec::with_capacity(total as usize);
    reconstruct_range(reference, ops, 0, 0, total, &mut out)?;
    Ok(out)
}

/// Produce target bases `[start, end)` and append them to `out`
///
/// `ops` describe the target from position `ops_offset` on, so a single
/// chunk can be applied without the rest of the script. Only the reference
/// bases covered by matches inside the range are fetched.
pub fn reconstruct_range<S: ReferenceSource + ?Sized>(
    source: &S,
    ops: &[EditOp],
    ops_offset: u64,
    start: u64,
    end: u64,
    out: &mut Vec<u8>,
) -> Result<()> {
    if start > end || start < ops_offset {
        return Err(AgcError::InvalidInput(format!(
            "range {start}..{end} not covered by script starting at {ops_offset}"
        )));
    }

    let mut pos = ops_offset;
    for op in ops {
        if pos >= end {
            break;
        }
        let op_end = pos + op.target_len();
        if op_end <= start {
            pos = op_end;
            continue;
        }

        let from = start.max(pos) - pos;
        let to = end.min(op_end) - pos;

        match op {
            EditOp::Match { ref_pos, len } => {
                if ref_pos + len > source.ref_len() {
                    return Err(AgcError::corrupted(format!(
                        "match {ref_pos}+{len} beyond reference of length {}",
                        source.ref_len()
                    )));
                }
                source.fetch(ref_pos + from, ref_pos + to, out)?;
            }
            EditOp::Literal(codes) => {
                out.extend_from_slice(&codes[from as usize..to as usize]);
            }
            EditOp::NRun(_) => {
                out.resize(out.len() + (to - from) as usize, N_CODE);
            }
        }
        pos = op_end;
    }

    if pos < end {
        return Err(AgcError::corrupted(format!(
            "edit script ends at {pos}, range needs {end}"
        )));
    }
    Ok(())
}

/// Split a script at every multiple of `segment_size` target bases
pub fn split_into_chunks(ops: &[EditOp], segment_size: u64) -> Vec<Vec<EditOp>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut room = segment_size;

    for op in ops {
        let mut op = op.clone();
        while op.target_len() > room {
            let (head, tail) = op.split_at(room);
            current.push(head);
            chunks.push(std::mem::take(&mut current));
            room = segment_size;
            op = tail;
        }
        room -= op.target_len();
        if op.target_len() > 0 {
            current.push(op);
        }
        if room == 0 {
            chunks.push(std::mem::take(&mut current));
            room = segment_size;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

const LITERAL_BASE: u8 = b'A';
const N_RUN_START: u8 = 0x1E;
const N_RUN_END: u8 = 0x04;

/// Serialize one chunk
///
/// Match positions are written relative to where the reference would be
/// if target and reference were colinear; `pred_start` is that position at
/// the start of the chunk.
pub fn encode_chunk(ops: &[EditOp], pred_start: u64) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pred = pred_start as i64;

    for op in ops {
        match op {
            EditOp::Match { ref_pos, len } => {
                let offset = *ref_pos as i64 - pred;
                out.extend_from_slice(offset.to_string().as_bytes());
                out.push(b',');
                out.extend_from_slice(len.to_string().as_bytes());
                out.push(b'.');
                pred = (ref_pos + len) as i64;
            }
            EditOp::Literal(codes) => {
                out.extend(codes.iter().map(|&c| LITERAL_BASE + c));
                pred += codes.len() as i64;
            }
            EditOp::NRun(len) => {
                out.push(N_RUN_START);
                out.extend_from_slice(len.to_string().as_bytes());
                out.push(N_RUN_END);
            }
        }
    }

    out
}

/// Parse one chunk written by [`encode_chunk`]
pub fn decode_chunk(data: &[u8], pred_start: u64) -> Result<Vec<EditOp>> {
    let mut ops = Vec::new();
    let mut literal = Vec::new();
    let mut pred = pred_start as i64;
    let mut i = 0;

    while i < data.len() {
        let c = data[i];

        if (LITERAL_BASE..LITERAL_BASE + agcx_common::NO_CODES).contains(&c) {
            literal.push(c - LITERAL_BASE);
            pred += 1;
            i += 1;
            continue;
        }

        if !literal.is_empty() {
            ops.push(EditOp::Literal(std::mem::take(&mut literal)));
        }

        if c == N_RUN_START {
            let (len, next) = parse_number(data, i + 1, N_RUN_END)?;
            ops.push(EditOp::NRun(to_length(len)?));
            i = next;
        } else if c == b'-' || c.is_ascii_digit() {
            let (offset, next) = parse_number(data, i, b',')?;
            let (len, next) = parse_number(data, next, b'.')?;
            let len = to_length(len)?;
            let ref_pos = pred + offset;
            if ref_pos < 0 {
                return Err(AgcError::corrupted(format!(
                    "match at negative reference position {ref_pos}"
                )));
            }
            ops.push(EditOp::Match {
                ref_pos: ref_pos as u64,
                len,
            });
            pred = ref_pos + len as i64;
            i = next;
        } else {
            return Err(AgcError::corrupted(format!(
                "unexpected byte {c:#04x} in edit script at {i}"
            )));
        }
    }

    if !literal.is_empty() {
        ops.push(EditOp::Literal(literal));
    }
    Ok(ops)
}

/// Parse a signed decimal at `data[i..]` terminated by `term`; returns the
/// value and the index after the terminator
fn parse_number(data: &[u8], i: usize, term: u8) -> Result<(i64, usize)> {
    let end = data[i.min(data.len())..]
        .iter()
        .position(|&b| b == term)
        .map(|p| i + p)
        .ok_or_else(|| AgcError::corrupted("unterminated number in edit script"))?;

    let value = std::str::from_utf8(&data[i..end])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            AgcError::corrupted(format!(
                "bad number {:?} in edit script",
                String::from_utf8_lossy(&data[i..end])
            ))
        })?;

    Ok((value, end + 1))
}

fn to_length(value: i64) -> Result<u64> {
    if value <= 0 {
        return Err(AgcError::corrupted(format!(
            "non-positive length {value} in edit script"
        )));
    }
    Ok(value as u64)
}

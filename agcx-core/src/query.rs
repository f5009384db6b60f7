// Contig queries and range clamping

use agcx_common::AgcError;
use std::fmt;
use std::str::FromStr;

/// Fit a window of `len` bases starting at `start` into a contig
///
/// Returns inclusive `(start, end)`. A window running past the end is
/// shifted left so that it ends on the last base; a window longer than the
/// contig becomes the whole contig. `None` for an empty window or contig.
pub fn clamp_range(start: u64, len: u64, contig_len: u64) -> Option<(u64, u64)> {
    if len == 0 || contig_len == 0 {
        return None;
    }

    let mut start = start;
    let mut end = start.saturating_add(len - 1);
    if end >= contig_len {
        end = contig_len - 1;
        start = if len > contig_len { 0 } else { end - (len - 1) };
    }
    Some((start, end))
}

/// A contig request as written on the command line
///
/// Forms: `contig`, `contig@sample`, `contig:from-to`,
/// `contig@sample:from-to`; the range is 0-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigQuery {
    pub contig: String,
    pub sample: Option<String>,
    pub range: Option<(u64, u64)>,
}

impl ContigQuery {
    pub fn new(contig: &str) -> Self {
        ContigQuery {
            contig: contig.to_string(),
            sample: None,
            range: None,
        }
    }

    fn parse_range(s: &str) -> Option<(u64, u64)> {
        let (from, to) = s.split_once('-')?;
        let from = from.parse().ok()?;
        let to = to.parse().ok()?;
        (from <= to).then_some((from, to))
    }
}

impl FromStr for ContigQuery {
    type Err = AgcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Contig names may contain ':' themselves; only a parsable suffix is a range
        let (name_part, range) = match s.rfind(':') {
            Some(pos) => match Self::parse_range(&s[pos + 1..]) {
                Some(range) => (&s[..pos], Some(range)),
                None => (s, None),
            },
            None => (s, None),
        };

        let (contig, sample) = match name_part.rfind('@') {
            Some(pos) => (&name_part[..pos], Some(&name_part[pos + 1..])),
            None => (name_part, None),
        };

        if contig.is_empty() {
            return Err(AgcError::InvalidInput(format!(
                "no contig name in query {s:?}"
            )));
        }

        Ok(ContigQuery {
            contig: contig.to_string(),
            sample: sample.filter(|s| !s.is_empty()).map(String::from),
            range,
        })
    }
}

impl fmt::Display for ContigQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.contig)?;
        if let Some(sample) = &self.sample {
            write!(f, "@{sample}")?;
        }
        if let Some((from, to)) = self.range {
            write!(f, ":{from}-{to}")?;
        }
        Ok(())
    }
}

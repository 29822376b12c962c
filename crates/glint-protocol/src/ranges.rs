use crate::error::RangeError;
use crate::packet::MAX_TOTAL_CHUNKS;

/// Render sequence numbers as contiguous runs: `[1,2,3,5,7,8]` becomes `"1-3, 5, 7-8"`.
///
/// Input may be unsorted or contain duplicates. An empty list renders as `"None"`.
pub fn format_ranges(seqs: &[u32]) -> String {
    let mut sorted = seqs.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let Some((&first, rest)) = sorted.split_first() else {
        return "None".to_string();
    };

    let mut parts = Vec::new();
    let (mut start, mut end) = (first, first);
    for &seq in rest {
        if seq == end + 1 {
            end = seq;
        } else {
            parts.push(render_run(start, end));
            start = seq;
            end = seq;
        }
    }
    parts.push(render_run(start, end));
    parts.join(", ")
}

fn render_run(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}-{}", start, end)
    }
}

/// Parse operator input such as `"1-3, 5 7-8"` into ascending, deduplicated numbers.
///
/// Separators are commas and whitespace. `"None"` and empty input parse to an empty list.
pub fn parse_ranges(input: &str) -> Result<Vec<u32>, RangeError> {
    let mut seqs = Vec::new();
    for token in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token.eq_ignore_ascii_case("none") {
            continue;
        }
        match token.split_once('-') {
            Some((start, end)) => {
                let start = parse_seq(start)?;
                let end = parse_seq(end)?;
                if start > end {
                    return Err(RangeError::Descending { start, end });
                }
                seqs.extend(start..=end);
            }
            None => seqs.push(parse_seq(token)?),
        }
    }
    seqs.sort_unstable();
    seqs.dedup();
    Ok(seqs)
}

fn parse_seq(token: &str) -> Result<u32, RangeError> {
    let seq: u32 = token
        .trim()
        .parse()
        .map_err(|_| RangeError::InvalidNumber(token.to_string()))?;
    if seq == 0 {
        return Err(RangeError::Zero);
    }
    if seq > MAX_TOTAL_CHUNKS {
        return Err(RangeError::TooLarge(seq));
    }
    Ok(seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_runs() {
        assert_eq!(format_ranges(&[1, 2, 3, 5, 7, 8]), "1-3, 5, 7-8");
        assert_eq!(format_ranges(&[]), "None");
        assert_eq!(format_ranges(&[4]), "4");
        assert_eq!(format_ranges(&[2, 4]), "2, 4");
    }

    #[test]
    fn format_sorts_and_dedups() {
        assert_eq!(format_ranges(&[8, 7, 7, 1, 3, 2]), "1-3, 7-8");
    }

    #[test]
    fn parse_inverts_format() {
        let seqs = vec![1, 2, 3, 5, 7, 8, 20];
        assert_eq!(parse_ranges(&format_ranges(&seqs)).unwrap(), seqs);
        assert_eq!(parse_ranges("None").unwrap(), Vec::<u32>::new());
        assert_eq!(parse_ranges("").unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn parse_accepts_loose_input() {
        assert_eq!(parse_ranges(" 3 3,1  2-2 ").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_ranges("0").unwrap_err(), RangeError::Zero);
        assert_eq!(
            parse_ranges("5-2").unwrap_err(),
            RangeError::Descending { start: 5, end: 2 }
        );
        assert!(matches!(parse_ranges("x"), Err(RangeError::InvalidNumber(_))));
        assert!(matches!(parse_ranges("1-"), Err(RangeError::InvalidNumber(_))));
        assert_eq!(
            parse_ranges("1-4000000000").unwrap_err(),
            RangeError::TooLarge(4_000_000_000)
        );
    }
}

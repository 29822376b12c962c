use crate::error::CapacityError;

/// Slice an encoded stream into pieces of at most `chunk_size` bytes.
///
/// Concatenating the result reproduces `encoded` exactly. An empty stream
/// yields no slices. Slices never split a UTF-8 character, so for the ASCII
/// streams the sender produces the count is `ceil(len / chunk_size)`.
pub fn split_encoded(encoded: &str, chunk_size: usize) -> Result<Vec<&str>, CapacityError> {
    if chunk_size == 0 {
        return Err(CapacityError::ZeroChunk);
    }

    let mut slices = Vec::with_capacity(encoded.len().div_ceil(chunk_size));
    let mut rest = encoded;
    let mut offset = 0usize;
    while !rest.is_empty() {
        let mut end = chunk_size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            return Err(CapacityError::UnsplittableChar {
                offset,
                size: chunk_size,
            });
        }
        let (head, tail) = rest.split_at(end);
        slices.push(head);
        rest = tail;
        offset += end;
    }
    Ok(slices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stream_has_no_slices() {
        assert!(split_encoded("", 10).unwrap().is_empty());
    }

    #[test]
    fn concatenation_reproduces_input() {
        let stream: String = (0..1000u32)
            .map(|i| char::from(b'A' + (i % 26) as u8))
            .collect();
        for size in [1usize, 2, 3, 7, 64, 999, 1000, 1001, 5000] {
            let slices = split_encoded(&stream, size).unwrap();
            assert_eq!(slices.concat(), stream);
            assert_eq!(slices.len(), stream.len().div_ceil(size));
            assert!(slices.iter().all(|s| !s.is_empty() && s.len() <= size));
        }
    }

    #[test]
    fn last_slice_holds_remainder() {
        let slices = split_encoded("AABBCCDDEE", 4).unwrap();
        assert_eq!(slices, vec!["AABB", "CCDD", "EE"]);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert_eq!(split_encoded("abc", 0).unwrap_err(), CapacityError::ZeroChunk);
    }

    #[test]
    fn multibyte_chars_stay_whole() {
        let slices = split_encoded("aéb", 2).unwrap();
        assert_eq!(slices, vec!["a", "é", "b"]);
        assert!(matches!(
            split_encoded("é", 1).unwrap_err(),
            CapacityError::UnsplittableChar { offset: 0, size: 1 }
        ));
    }
}

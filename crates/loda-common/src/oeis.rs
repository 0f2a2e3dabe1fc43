/// Formats a numeric OEIS id as `A######` (zero-padded to six digits), per
/// the glossary. Ids beyond six digits are still rendered in full, just
/// without truncation.
pub fn oeis_id_str(id: i64) -> String {
    format!("A{:06}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding() {
        assert_eq!(oeis_id_str(45), "A000045");
        assert_eq!(oeis_id_str(0), "A000000");
    }

    #[test]
    fn test_overflow_not_truncated() {
        assert_eq!(oeis_id_str(1_234_567), "A1234567");
    }
}

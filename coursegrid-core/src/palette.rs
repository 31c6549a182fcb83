/// Calendar colors, indexed by id
pub const PALETTE: [&str; 10] = [
    "#4E79A7", "#F28E2B", "#E15759", "#76B7B2", "#59A14F", "#EDC948", "#B07AA1", "#FF9DA7",
    "#9C755F", "#BAB0AC",
];

/// Stable display color for an id; negative ids wrap like positive ones.
pub fn color_for(id: i64) -> &'static str {
    let len = PALETTE.len() as i64;
    // rem_euclid keeps the index in 0..len
    let index = usize::try_from(id.rem_euclid(len)).unwrap_or(0);
    PALETTE[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_wraps_around() {
        assert_eq!(color_for(0), PALETTE[0]);
        assert_eq!(color_for(3), PALETTE[3]);
        assert_eq!(color_for(10), PALETTE[0]);
        assert_eq!(color_for(23), PALETTE[3]);
        assert_eq!(color_for(-1), PALETTE[9]);
        assert_eq!(color_for(i64::MIN), PALETTE[2]);
    }
}

/// Converts a grade on the 0–20 scale into a performance band.
///
/// | Range       | Band |
/// |-------------|------|
/// | >= 16       | I    |
/// | >= 14       | II   |
/// | >= 12       | III  |
/// | >= 10       | IV   |
/// | < 10        | V    |
pub fn grade_band(g: f64) -> &'static str {
    match g {
        g if g >= 16.0 => "I",
        g if g >= 14.0 => "II",
        g if g >= 12.0 => "III",
        g if g >= 10.0 => "IV",
        _ => "V",
    }
}

/// All bands, best first.
pub const BANDS: [&str; 5] = ["I", "II", "III", "IV", "V"];

/// Number of values in each band, ordered as [`BANDS`]. Missing values are skipped.
pub fn band_counts(values: impl IntoIterator<Item = Option<f64>>) -> Vec<(&'static str, usize)> {
    let mut counts = [0usize; 5];
    for g in values.into_iter().flatten() {
        let band = grade_band(g);
        if let Some(i) = BANDS.iter().position(|b| *b == band) {
            counts[i] += 1;
        }
    }
    BANDS.iter().copied().zip(counts).collect()
}

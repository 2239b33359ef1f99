//! Supervised windows over a price series
//!
//! A window is a fixed-length slice of the series paired with the value that
//! immediately follows it. Windows are produced with stride 1.

/// Input windows and their labels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Windows {
    /// Fixed-length input slices
    pub inputs: Vec<Vec<f64>>,
    /// Value following each input slice
    pub labels: Vec<f64>,
}

impl Windows {
    /// Number of window/label pairs
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no pairs were produced
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterate over `(input, label)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&[f64], f64)> + '_ {
        self.inputs
            .iter()
            .map(Vec::as_slice)
            .zip(self.labels.iter().copied())
    }

    /// Split into the first `n` pairs and the rest
    pub fn split_at(&self, n: usize) -> (Windows, Windows) {
        let n = n.min(self.len());
        (
            Windows {
                inputs: self.inputs[..n].to_vec(),
                labels: self.labels[..n].to_vec(),
            },
            Windows {
                inputs: self.inputs[n..].to_vec(),
                labels: self.labels[n..].to_vec(),
            },
        )
    }
}

/// Build `series.len() - window_len` window/label pairs
///
/// Returns an empty set when the series is not longer than the window.
pub fn make_windows(series: &[f64], window_len: usize) -> Windows {
    if window_len == 0 || series.len() <= window_len {
        return Windows::default();
    }

    let count = series.len() - window_len;
    let mut inputs = Vec::with_capacity(count);
    let mut labels = Vec::with_capacity(count);

    for (i, window) in series.windows(window_len).take(count).enumerate() {
        inputs.push(window.to_vec());
        labels.push(series[i + window_len]);
    }

    Windows { inputs, labels }
}

/// The trailing `window_len` values, if the series is long enough
pub fn last_window(series: &[f64], window_len: usize) -> Option<&[f64]> {
    if window_len == 0 || series.len() < window_len {
        return None;
    }
    Some(&series[series.len() - window_len..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(20, 10, 10)]
    #[case(11, 10, 1)]
    #[case(10, 10, 0)]
    #[case(5, 10, 0)]
    #[case(6, 1, 5)]
    fn test_window_count(#[case] n: usize, #[case] w: usize, #[case] expected: usize) {
        let series: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let windows = make_windows(&series, w);

        assert_eq!(windows.len(), expected);
        for (i, (input, label)) in windows.iter().enumerate() {
            assert_eq!(input.len(), w);
            assert_eq!(input, &series[i..i + w]);
            assert_eq!(label, series[i + w]);
        }
    }

    #[test]
    fn test_single_window_scenario() {
        let series = vec![
            100.0, 102.0, 101.0, 105.0, 107.0, 106.0, 110.0, 112.0, 111.0, 115.0, 117.0,
        ];
        let windows = make_windows(&series, 10);

        assert_eq!(windows.len(), 1);
        assert_eq!(
            windows.inputs[0],
            vec![100.0, 102.0, 101.0, 105.0, 107.0, 106.0, 110.0, 112.0, 111.0, 115.0]
        );
        assert_eq!(windows.labels[0], 117.0);
    }

    #[test]
    fn test_zero_window_is_empty() {
        assert!(make_windows(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn test_split_and_last_window() {
        let series: Vec<f64> = (0..15).map(|i| i as f64).collect();
        let windows = make_windows(&series, 10);
        let (train, val) = windows.split_at(4);

        assert_eq!(train.len(), 4);
        assert_eq!(val.len(), 1);
        assert_eq!(val.labels[0], 14.0);

        assert_eq!(last_window(&series, 3), Some(&[12.0, 13.0, 14.0][..]));
        assert_eq!(last_window(&series, 16), None);
    }
}

/// Rolling median over the last `W` samples.
///
/// The buffer starts zeroed; callers prime it with `W` live samples before
/// trusting the output (see `Controller::boot`).
pub struct MedianFilter<const W: usize> {
    window: [f32; W],
    cursor: usize,
}

impl<const W: usize> MedianFilter<W> {
    pub const fn new() -> Self {
        Self {
            window: [0.0; W],
            cursor: 0,
        }
    }

    /// Store `sample` at the cursor, advance it and return the window median.
    pub fn push(&mut self, sample: f32) -> f32 {
        self.window[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % W;
        median(&self.window)
    }

    pub fn window(&self) -> &[f32; W] {
        &self.window
    }
}

impl<const W: usize> Default for MedianFilter<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Middle element of a sorted copy. `W` is small, so insertion sort.
pub fn median<const W: usize>(window: &[f32; W]) -> f32 {
    let mut sorted = *window;
    for i in 1..W {
        let mut j = i;
        while j > 0 && sorted[j - 1].total_cmp(&sorted[j]).is_gt() {
            sorted.swap(j - 1, j);
            j -= 1;
        }
    }
    sorted[W / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_single_spike() {
        let mut f = MedianFilter::<5>::new();
        for s in [20.0, 20.1, 19.9, 20.0] {
            f.push(s);
        }
        let out = f.push(95.0);
        assert_eq!(out, 20.0);
    }

    #[test]
    fn output_stays_within_window_bounds() {
        let samples = [301.2, 299.8, 350.0, 12.0, 300.4, 300.1, 298.7, 305.5, 0.0, 301.0];
        let mut f = MedianFilter::<5>::new();
        for s in samples {
            f.push(s);
        }
        // window now holds the last five samples
        let w = *f.window();
        let lo = w.iter().cloned().fold(f32::INFINITY, f32::min);
        let hi = w.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let m = median(&w);
        assert!(m >= lo && m <= hi);
        assert_eq!(m, 300.1);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let orders: [[f32; 5]; 4] = [
            [1.0, 2.0, 3.0, 4.0, 5.0],
            [5.0, 4.0, 3.0, 2.0, 1.0],
            [3.0, 1.0, 5.0, 2.0, 4.0],
            [2.0, 5.0, 1.0, 4.0, 3.0],
        ];
        for order in orders {
            let mut f = MedianFilter::<5>::new();
            let mut last = 0.0;
            for s in order {
                last = f.push(s);
            }
            assert_eq!(last, 3.0);
        }
    }

    #[test]
    fn primed_window_has_no_zero_transient() {
        let mut f = MedianFilter::<5>::new();
        for _ in 0..5 {
            f.push(77.0);
        }
        assert_eq!(f.push(77.5), 77.0);
        assert!(f.window().iter().all(|&s| s != 0.0));
    }

    #[test]
    fn cursor_wraps_and_overwrites_oldest() {
        let mut f = MedianFilter::<3>::new();
        f.push(1.0);
        f.push(2.0);
        f.push(3.0);
        f.push(10.0);
        assert_eq!(f.window(), &[10.0, 2.0, 3.0]);
    }
}

//! Simple linear interpolation

#[derive(Clone, Copy, Debug)]
pub struct Interval {
    min: f32,
    width: f32,
}

impl Interval {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            min,
            width: max - min,
        }
    }

    pub fn max(&self) -> f32 {
        self.min + self.width
    }
}

pub struct Lerp {
    pub from: Interval,
    pub to: Interval,
}

impl Lerp {
    pub fn map(&self, value: f32) -> f32 {
        if self.from.width == 0.0 {
            self.to.min
        } else {
            (value - self.from.min) * (self.to.width / self.from.width) + self.to.min
        }
    }

    /// Like [`Lerp::map`], but the input is clamped to the `from` interval first.
    pub fn map_clamped(&self, value: f32) -> f32 {
        let (low, high) = if self.from.width < 0.0 {
            (self.from.max(), self.from.min)
        } else {
            (self.from.min, self.from.max())
        };

        self.map(value.clamp(low, high))
    }
}

/// Evaluates the piecewise linear function through `points` at `x`.
///
/// `points` must be sorted by ascending x coordinate; `coords` extracts the `(x, y)` pair of a
/// point. Inputs outside the table are clamped to the first or last point. Returns `None` for
/// an empty table.
///
/// ```rust
/// # use signal_processing::lerp::piecewise;
/// let table = [(3072.0, 0.0), (3584.0, 16.0), (4096.0, 80.0)];
///
/// assert_eq!(piecewise(&table, 2500.0, |p| *p), Some(0.0));
/// assert_eq!(piecewise(&table, 3328.0, |p| *p), Some(8.0));
/// assert_eq!(piecewise(&table, 3840.0, |p| *p), Some(48.0));
/// assert_eq!(piecewise(&table, 4500.0, |p| *p), Some(80.0));
/// ```
pub fn piecewise<P>(points: &[P], x: f32, coords: impl Fn(&P) -> (f32, f32)) -> Option<f32> {
    let (first_x, first_y) = coords(points.first()?);
    if x <= first_x {
        return Some(first_y);
    }

    let (last_x, last_y) = coords(points.last()?);
    if x >= last_x {
        return Some(last_y);
    }

    let segment = points.windows(2).find_map(|pair| {
        let (lo_x, lo_y) = coords(&pair[0]);
        let (hi_x, hi_y) = coords(&pair[1]);

        (lo_x <= x && x < hi_x).then(|| Lerp {
            from: Interval::new(lo_x, hi_x),
            to: Interval::new(lo_y, hi_y),
        })
    });

    Some(segment.map_or(last_y, |lerp| lerp.map(x)))
}

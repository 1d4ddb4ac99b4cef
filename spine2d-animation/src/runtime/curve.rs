//! Packed keyframe storage shared by every curve-interpolated timeline.
//!
//! `frames` holds `entries` floats per key: the key time followed by its values. `curves` holds
//! one interpolation descriptor per key (`LINEAR`, `STEPPED`, or `BEZIER + offset` into the
//! sample table that follows the descriptors). Each Bezier segment is pre-sampled into
//! `BEZIER_SIZE / 2` points per value so evaluation is a short linear scan instead of a cubic
//! root solve.

pub const LINEAR: f32 = 0.0;
pub const STEPPED: f32 = 1.0;
pub const BEZIER: f32 = 2.0;
/// Floats stored per sampled Bezier segment: 9 (x, y) points strictly between the two keys.
pub const BEZIER_SIZE: usize = 18;

const DENOM_EPSILON: f32 = 1.0e-12;

/// Interpolation used between a key and the next one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CurveType {
    Linear,
    Stepped,
    /// Offset of the segment's samples in the curves buffer.
    Bezier(usize),
}

/// Index of the key at or before `time`, in units of `frames` floats. Returns the first key when
/// `time` precedes it, and the last key when `time` is past it.
pub fn search(frames: &[f32], time: f32, step: usize) -> usize {
    let count = frames.len() / step;
    let (mut lo, mut hi) = (1usize, count);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if frames[mid * step] > time {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    (lo - 1) * step
}

#[derive(Clone, Debug, PartialEq)]
pub struct CurveFrames {
    frames: Vec<f32>,
    curves: Vec<f32>,
    entries: usize,
}

impl CurveFrames {
    /// `entries` is the key width including the time slot. `bezier_count` is the number of
    /// Bezier segments, counting each value of a multi-value key separately.
    pub fn new(frame_count: usize, bezier_count: usize, entries: usize) -> Self {
        let mut curves = vec![LINEAR; frame_count + bezier_count * BEZIER_SIZE];
        if frame_count > 0 {
            curves[frame_count - 1] = STEPPED;
        }
        Self {
            frames: vec![0.0; frame_count * entries],
            curves,
            entries,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len() / self.entries
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn frames(&self) -> &[f32] {
        &self.frames
    }

    pub fn curves(&self) -> &[f32] {
        &self.curves
    }

    pub fn first_time(&self) -> Option<f32> {
        self.frames.first().copied()
    }

    /// Time of the last key.
    pub fn duration(&self) -> f32 {
        if self.frames.is_empty() {
            return 0.0;
        }
        self.frames[self.frames.len() - self.entries]
    }

    /// Writes a key. Missing trailing values keep their previous contents.
    ///
    /// Panics if `frame` is not below the frame count.
    pub fn set_frame(&mut self, frame: usize, time: f32, values: &[f32]) {
        let start = frame * self.entries;
        self.frames[start] = time;
        for (slot, value) in self.frames[start + 1..start + self.entries]
            .iter_mut()
            .zip(values)
        {
            *slot = *value;
        }
    }

    /// Panics if `frame` is not below the frame count.
    pub fn set_linear(&mut self, frame: usize) {
        self.curves[frame] = LINEAR;
    }

    /// Panics if `frame` is not below the frame count.
    pub fn set_stepped(&mut self, frame: usize) {
        self.curves[frame] = STEPPED;
    }

    pub fn curve_type(&self, frame: usize) -> CurveType {
        let descriptor = self.curves[frame];
        if descriptor == LINEAR {
            CurveType::Linear
        } else if descriptor == STEPPED {
            CurveType::Stepped
        } else {
            CurveType::Bezier((descriptor - BEZIER) as usize)
        }
    }

    /// Samples one Bezier segment between `frame` and `frame + 1` for the value at
    /// `value` (0 based) by forward differencing. `bezier` is the segment's index in the sample
    /// table; segments of a multi-value key must be consecutive, value 0 first.
    ///
    /// Panics if `frame` is not below the frame count.
    #[allow(clippy::too_many_arguments)]
    pub fn set_bezier(
        &mut self,
        bezier: usize,
        frame: usize,
        value: usize,
        time1: f32,
        value1: f32,
        cx1: f32,
        cy1: f32,
        cx2: f32,
        cy2: f32,
        time2: f32,
        value2: f32,
    ) {
        let mut i = self.frame_count() + bezier * BEZIER_SIZE;
        if value == 0 {
            self.curves[frame] = BEZIER + i as f32;
        }
        let tmpx = (time1 - cx1 * 2.0 + cx2) * 0.03;
        let tmpy = (value1 - cy1 * 2.0 + cy2) * 0.03;
        let dddx = ((cx1 - cx2) * 3.0 - time1 + time2) * 0.006;
        let dddy = ((cy1 - cy2) * 3.0 - value1 + value2) * 0.006;
        let mut ddx = tmpx * 2.0 + dddx;
        let mut ddy = tmpy * 2.0 + dddy;
        let mut dx = (cx1 - time1) * 0.3 + tmpx + dddx * 0.16666667;
        let mut dy = (cy1 - value1) * 0.3 + tmpy + dddy * 0.16666667;
        let mut x = time1 + dx;
        let mut y = value1 + dy;
        let end = i + BEZIER_SIZE;
        while i < end {
            self.curves[i] = x;
            self.curves[i + 1] = y;
            dx += ddx;
            dy += ddy;
            ddx += dddx;
            ddy += dddy;
            x += dx;
            y += dy;
            i += 2;
        }
    }

    /// Interpolated value at `time` for the value slot `value_offset` (1 based) of the key
    /// starting at `frame_index`.
    pub fn value_at(&self, time: f32, frame_index: usize, value_offset: usize) -> f32 {
        if frame_index + self.entries >= self.frames.len() {
            return self.frames[frame_index + value_offset];
        }
        match self.curve_type(frame_index / self.entries) {
            CurveType::Linear => {
                let before = self.frames[frame_index];
                let value = self.frames[frame_index + value_offset];
                let next = frame_index + self.entries;
                let denom = self.frames[next] - before;
                if denom.abs() <= DENOM_EPSILON {
                    return self.frames[next + value_offset];
                }
                value + (time - before) / denom * (self.frames[next + value_offset] - value)
            }
            CurveType::Stepped => self.frames[frame_index + value_offset],
            CurveType::Bezier(offset) => self.bezier_value(
                time,
                frame_index,
                value_offset,
                offset + (value_offset - 1) * BEZIER_SIZE,
            ),
        }
    }

    /// Value of a single-value timeline at `time`.
    pub fn curve_value(&self, time: f32) -> f32 {
        let i = search(&self.frames, time, self.entries);
        self.value_at(time, i, 1)
    }

    /// Interpolation percent (0..1) between `frame` and the next key, for timelines whose keys
    /// carry their payload outside `frames` (deform). Bezier samples are expected to map 0..1.
    pub fn curve_percent(&self, time: f32, frame: usize) -> f32 {
        let frame_index = frame * self.entries;
        let next_time = self.frames[frame_index + self.entries];
        match self.curve_type(frame) {
            CurveType::Linear => {
                let x = self.frames[frame_index];
                let denom = next_time - x;
                if denom.abs() <= DENOM_EPSILON {
                    return 1.0;
                }
                (time - x) / denom
            }
            CurveType::Stepped => 0.0,
            CurveType::Bezier(i) => {
                let curves = &self.curves;
                if curves[i] > time {
                    let x = self.frames[frame_index];
                    let denom = curves[i] - x;
                    if denom.abs() <= DENOM_EPSILON {
                        return curves[i + 1];
                    }
                    return curves[i + 1] * (time - x) / denom;
                }
                let n = i + BEZIER_SIZE;
                let mut j = i + 2;
                while j < n {
                    if curves[j] >= time {
                        let x = curves[j - 2];
                        let y = curves[j - 1];
                        let denom = curves[j] - x;
                        if denom.abs() <= DENOM_EPSILON {
                            return y;
                        }
                        return y + (time - x) / denom * (curves[j + 1] - y);
                    }
                    j += 2;
                }
                let x = curves[n - 2];
                let y = curves[n - 1];
                let denom = next_time - x;
                if denom.abs() <= DENOM_EPSILON {
                    return 1.0;
                }
                y + (1.0 - y) * (time - x) / denom
            }
        }
    }

    fn bezier_value(&self, time: f32, frame_index: usize, value_offset: usize, i: usize) -> f32 {
        let curves = &self.curves;
        if curves[i] > time {
            let x = self.frames[frame_index];
            let y = self.frames[frame_index + value_offset];
            let denom = curves[i] - x;
            if denom.abs() <= DENOM_EPSILON {
                return y;
            }
            return y + (time - x) / denom * (curves[i + 1] - y);
        }
        let n = i + BEZIER_SIZE;
        let mut j = i + 2;
        while j < n {
            if curves[j] >= time {
                let x = curves[j - 2];
                let y = curves[j - 1];
                let denom = curves[j] - x;
                if denom.abs() <= DENOM_EPSILON {
                    return y;
                }
                return y + (time - x) / denom * (curves[j + 1] - y);
            }
            j += 2;
        }
        let next = frame_index + self.entries;
        let x = curves[n - 2];
        let y = curves[n - 1];
        let denom = self.frames[next] - x;
        if denom.abs() <= DENOM_EPSILON {
            return y;
        }
        y + (time - x) / denom * (self.frames[next + value_offset] - y)
    }
}

//! Motion analysis over grayscale frames.
//!
//! A per-pixel running-average background model flags pixels that deviate
//! from the learned scene. The binary mask is cleaned with a 3x3 erosion
//! followed by a 3x3 dilation to suppress single-pixel noise, then scanned
//! for a connected component whose area clears the configured threshold.

/// Foreground mask value for a changed pixel.
const FOREGROUND: u8 = 255;

/// Default learning rate: how fast the background absorbs scene changes.
pub const DEFAULT_LEARNING_RATE: f32 = 0.05;

/// Default per-pixel difference (0-255) that counts as foreground.
pub const DEFAULT_DIFF_THRESHOLD: u8 = 25;

/// Running-average background model for one camera.
///
/// The first frame seeds the model and produces an empty mask; detection
/// starts from the second frame.
pub struct BackgroundModel {
    width: usize,
    height: usize,
    background: Vec<f32>,
    learning_rate: f32,
    diff_threshold: u8,
}

impl BackgroundModel {
    /// Model with the default noise tolerance.
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_params(width, height, DEFAULT_LEARNING_RATE, DEFAULT_DIFF_THRESHOLD)
    }

    pub fn with_params(
        width: usize,
        height: usize,
        learning_rate: f32,
        diff_threshold: u8,
    ) -> Self {
        Self {
            width,
            height,
            background: Vec::new(),
            learning_rate,
            diff_threshold,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Apply one frame: returns the foreground mask and updates the model.
    ///
    /// Panics in debug builds if the frame length does not match the model
    /// geometry; the frame source guarantees exact-length frames.
    pub fn apply(&mut self, frame: &[u8]) -> Vec<u8> {
        debug_assert_eq!(frame.len(), self.width * self.height);

        if self.background.is_empty() {
            self.background = frame.iter().map(|&p| p as f32).collect();
            return vec![0; frame.len()];
        }

        let mut mask = vec![0u8; frame.len()];
        for (i, &pixel) in frame.iter().enumerate() {
            let diff = (pixel as f32 - self.background[i]).abs();
            if diff > self.diff_threshold as f32 {
                mask[i] = FOREGROUND;
            }
            self.background[i] += self.learning_rate * (pixel as f32 - self.background[i]);
        }
        mask
    }
}

/// 3x3 erosion: a pixel survives only if its full 3x3 neighborhood is
/// foreground. Border pixels never survive.
pub fn erode(mask: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; mask.len()];
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let mut all_set = true;
            'window: for dy in 0..3 {
                for dx in 0..3 {
                    if mask[(y + dy - 1) * width + (x + dx - 1)] == 0 {
                        all_set = false;
                        break 'window;
                    }
                }
            }
            if all_set {
                out[y * width + x] = FOREGROUND;
            }
        }
    }
    out
}

/// 3x3 dilation: a pixel is set if any pixel in its 3x3 neighborhood is
/// foreground.
pub fn dilate(mask: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let y_lo = y.saturating_sub(1);
            let y_hi = (y + 1).min(height.saturating_sub(1));
            let x_lo = x.saturating_sub(1);
            let x_hi = (x + 1).min(width.saturating_sub(1));
            'window: for ny in y_lo..=y_hi {
                for nx in x_lo..=x_hi {
                    if mask[ny * width + nx] != 0 {
                        out[y * width + x] = FOREGROUND;
                        break 'window;
                    }
                }
            }
        }
    }
    out
}

/// Scan the mask for an 8-connected component with more than `min_area`
/// pixels. The first qualifying component short-circuits the scan; the
/// total component count is irrelevant.
pub fn has_component_larger_than(mask: &[u8], width: usize, height: usize, min_area: u32) -> bool {
    let mut visited = vec![false; mask.len()];
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if mask[start] == 0 || visited[start] {
            continue;
        }

        let mut area = 0u32;
        visited[start] = true;
        stack.push(start);
        while let Some(index) = stack.pop() {
            area += 1;
            if area > min_area {
                return true;
            }
            let x = index % width;
            let y = index / width;
            let y_lo = y.saturating_sub(1);
            let y_hi = (y + 1).min(height.saturating_sub(1));
            let x_lo = x.saturating_sub(1);
            let x_hi = (x + 1).min(width.saturating_sub(1));
            for ny in y_lo..=y_hi {
                for nx in x_lo..=x_hi {
                    let neighbor = ny * width + nx;
                    if mask[neighbor] != 0 && !visited[neighbor] {
                        visited[neighbor] = true;
                        stack.push(neighbor);
                    }
                }
            }
        }
    }
    false
}

/// Full detection step for one frame: subtraction, erosion, dilation,
/// component scan.
pub fn detect_motion(model: &mut BackgroundModel, frame: &[u8], min_area: u32) -> bool {
    let width = model.width();
    let height = model.height();
    let mask = model.apply(frame);
    let eroded = erode(&mask, width, height);
    let cleaned = dilate(&eroded, width, height);
    has_component_larger_than(&cleaned, width, height, min_area)
}

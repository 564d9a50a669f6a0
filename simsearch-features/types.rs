/// Row-major single-channel `f32` image, intensities in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct GrayImage {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl GrayImage {
    /// Black image of the given size
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![0.0; width * height],
            width,
            height,
        }
    }

    /// Wraps an existing buffer; `None` when the length does not match
    pub fn from_vec(data: Vec<f32>, width: usize, height: usize) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Sample with replicated borders
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let xx = x.clamp(0, self.width as isize - 1) as usize;
        let yy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[yy * self.width + xx]
    }

    /// Central-difference gradient `(gx, gy)`; caller keeps `(x, y)` off the outer ring
    #[inline]
    pub fn gradient(&self, x: usize, y: usize) -> (f32, f32) {
        let gx = self.get(x + 1, y) - self.get(x - 1, y);
        let gy = self.get(x, y + 1) - self.get(x, y - 1);
        (gx, gy)
    }
}

/// Geometry of one octave of the scale space
#[derive(Debug, Clone, Copy)]
pub struct OctaveLevel {
    pub index: usize,
    /// Image-to-octave coordinate factor (`2^index`)
    pub step: f32,
    pub width: usize,
    pub height: usize,
}

/// DoG extremum after sub-pixel refinement, in octave coordinates
#[derive(Debug, Clone, Copy)]
pub(crate) struct Extremum {
    pub octave: usize,
    pub layer: usize,
    pub x: usize,
    pub y: usize,
    /// Sub-pixel offset (x, y, layer)
    pub offset: [f32; 3],
    pub response: f32,
}

impl Extremum {
    /// Sigma relative to the octave
    pub fn octave_sigma(&self, sigma: f32, layers: usize) -> f32 {
        sigma * 2f32.powf((self.layer as f32 + self.offset[2]) / layers as f32)
    }
}

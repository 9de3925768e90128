use std::fmt;

/// A 3x3 convolution kernel with its normalization divisor.
///
/// Weights are row-major from the top-left neighbour (-1,-1) to the
/// bottom-right neighbour (1,1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel {
    weights: [f32; 9],
    weight: f32,
}

impl Kernel {
    /// Builds a kernel whose divisor is the sum of its weights, or 1 when the
    /// sum is zero (edge detectors). A negative sum is used as is.
    pub fn new(weights: [f32; 9]) -> Self {
        let sum: f32 = weights.iter().sum();
        let weight = if sum == 0.0 { 1.0 } else { sum };
        Self { weights, weight }
    }

    /// Builds a kernel with an explicit divisor. A zero divisor falls back to 1.
    pub fn with_weight(weights: [f32; 9], weight: f32) -> Self {
        let weight = if weight == 0.0 { 1.0 } else { weight };
        Self { weights, weight }
    }

    pub fn identity() -> Self {
        Self::new([0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0])
    }

    pub fn box_blur() -> Self {
        Self::new([1.0; 9])
    }

    pub fn weights(&self) -> &[f32; 9] {
        &self.weights
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Weights packed as three std140 rows (xyz used, w padding).
    pub fn rows(&self) -> [[f32; 4]; 3] {
        let w = &self.weights;
        [
            [w[0], w[1], w[2], 0.0],
            [w[3], w[4], w[5], 0.0],
            [w[6], w[7], w[8], 0.0],
        ]
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let weights: Vec<String> = self.weights.iter().map(|w| format!("{w}")).collect();
        write!(f, "[{}]/{}", weights.join(","), self.weight)
    }
}

/// Named kernels available without any configuration file.
pub fn builtin_kernels() -> Vec<(&'static str, Kernel)> {
    vec![
        ("identity", Kernel::identity()),
        ("box-blur", Kernel::box_blur()),
        (
            "gaussian",
            Kernel::new([1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]),
        ),
        (
            "sharpen",
            Kernel::new([0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0]),
        ),
        (
            "unsharpen",
            Kernel::new([-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0]),
        ),
        (
            "edge-detect",
            Kernel::new([-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0]),
        ),
        (
            "sobel-horizontal",
            Kernel::new([1.0, 2.0, 1.0, 0.0, 0.0, 0.0, -1.0, -2.0, -1.0]),
        ),
        (
            "sobel-vertical",
            Kernel::new([1.0, 0.0, -1.0, 2.0, 0.0, -2.0, 1.0, 0.0, -1.0]),
        ),
        (
            "emboss",
            Kernel::new([-2.0, -1.0, 0.0, -1.0, 1.0, 1.0, 0.0, 1.0, 2.0]),
        ),
    ]
}

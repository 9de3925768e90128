use std::sync::Arc;

/// Default palette strip width.
pub const DEFAULT_PALETTE_SIZE: u32 = 256;

/// A horizontal RGBA strip used as a lookup table indexed by the red channel.
///
/// The strip is one pixel tall; entry `i` of an `n`-wide strip covers the
/// normalized range `[i/n, (i+1)/n)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    name: String,
    texels: Arc<[[u8; 4]]>,
}

impl Palette {
    /// Builds a palette from explicit texels. Returns `None` for an empty strip.
    pub fn from_texels(name: impl Into<String>, texels: Vec<[u8; 4]>) -> Option<Self> {
        if texels.is_empty() {
            return None;
        }
        Some(Self {
            name: name.into(),
            texels: texels.into(),
        })
    }

    /// Linearly interpolates `stops` (position in [0,1], RGB) into `size`
    /// texels. Stops are sorted by position; positions outside [0,1] clamp.
    pub fn from_stops(name: impl Into<String>, stops: &[(f32, [u8; 3])], size: u32) -> Option<Self> {
        if stops.is_empty() || size == 0 {
            return None;
        }
        let mut stops: Vec<(f32, [u8; 3])> = stops
            .iter()
            .map(|(pos, rgb)| (pos.clamp(0.0, 1.0), *rgb))
            .collect();
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));

        let denominator = (size.max(2) - 1) as f32;
        let texels = (0..size)
            .map(|index| {
                let t = if size == 1 { 0.0 } else { index as f32 / denominator };
                let rgb = interpolate(&stops, t);
                [rgb[0], rgb[1], rgb[2], 255]
            })
            .collect();
        Self::from_texels(name, texels)
    }

    /// `palette[i] = (i/255, i/255, i/255)`.
    pub fn grayscale_ramp() -> Self {
        let texels: Vec<[u8; 4]> = (0..=255u8).map(|v| [v, v, v, 255]).collect();
        Self {
            name: "grayscale".to_string(),
            texels: Arc::from(texels),
        }
    }

    /// 1x1 white strip bound when no palette is active.
    pub(crate) fn placeholder() -> Self {
        Self {
            name: "placeholder".to_string(),
            texels: Arc::from(vec![[255u8, 255, 255, 255]]),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.texels.len() as u32
    }

    pub fn texels(&self) -> &[[u8; 4]] {
        &self.texels
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels[..])
    }

    /// Nearest, clamp-to-edge lookup at normalized coordinate `u`.
    pub fn lookup(&self, u: f32) -> [u8; 4] {
        let width = self.texels.len();
        let index = (u * width as f32).floor();
        let index = if index.is_nan() {
            0
        } else {
            (index.max(0.0) as usize).min(width - 1)
        };
        self.texels[index]
    }
}

fn interpolate(stops: &[(f32, [u8; 3])], t: f32) -> [u8; 3] {
    let first = stops[0];
    if t <= first.0 {
        return first.1;
    }
    for pair in stops.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if t <= end.0 {
            let span = end.0 - start.0;
            let f = if span <= f32::EPSILON { 1.0 } else { (t - start.0) / span };
            let mut rgb = [0u8; 3];
            for channel in 0..3 {
                let a = start.1[channel] as f32;
                let b = end.1[channel] as f32;
                rgb[channel] = (a + (b - a) * f).round().clamp(0.0, 255.0) as u8;
            }
            return rgb;
        }
    }
    stops[stops.len() - 1].1
}

/// Named palettes available without any configuration file.
pub fn builtin_palettes() -> Vec<Palette> {
    let gradient = |name: &str, stops: &[(f32, [u8; 3])]| {
        Palette::from_stops(name, stops, DEFAULT_PALETTE_SIZE)
    };
    [
        Some(Palette::grayscale_ramp()),
        gradient(
            "heat",
            &[
                (0.0, [0, 0, 0]),
                (0.4, [200, 0, 0]),
                (0.75, [255, 200, 0]),
                (1.0, [255, 255, 255]),
            ],
        ),
        gradient(
            "ocean",
            &[(0.0, [0, 8, 40]), (0.5, [0, 110, 160]), (1.0, [200, 255, 255])],
        ),
        gradient("sepia", &[(0.0, [30, 15, 5]), (1.0, [255, 235, 190])]),
    ]
    .into_iter()
    .flatten()
    .collect()
}

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Widest palette strip accepted from a config file.
pub const MAX_PALETTE_SIZE: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheSetting {
    OnDemand,
    Disabled,
}

/// `WIDTHxHEIGHT` in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl FromStr for SurfaceSize {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let (width, height) = normalized
            .split_once('x')
            .ok_or_else(|| format!("invalid size '{raw}'; expected WIDTHxHEIGHT"))?;
        let parse = |value: &str| {
            value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| format!("invalid size '{raw}'; dimensions must be positive integers"))
        };
        Ok(Self {
            width: parse(width)?,
            height: parse(height)?,
        })
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl Serialize for SurfaceSize {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SurfaceSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// One palette gradient stop: `#rrggbb` with an optional `@position`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub rgb: [u8; 3],
    pub position: Option<f32>,
}

impl FromStr for ColorStop {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (color, position) = match trimmed.split_once('@') {
            Some((color, position)) => {
                let position = position
                    .trim()
                    .parse::<f32>()
                    .map_err(|_| format!("invalid stop position in '{raw}'"))?;
                if !(0.0..=1.0).contains(&position) {
                    return Err(format!("stop position in '{raw}' must be within 0..=1"));
                }
                (color.trim(), Some(position))
            }
            None => (trimmed, None),
        };
        let hex = color
            .strip_prefix('#')
            .filter(|hex| hex.len() == 6 && hex.chars().all(|ch| ch.is_ascii_hexdigit()))
            .ok_or_else(|| format!("invalid color '{raw}'; expected #rrggbb"))?;
        let channel = |index: usize| {
            u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16)
                .map_err(|_| format!("invalid color '{raw}'"))
        };
        Ok(Self {
            rgb: [channel(0)?, channel(1)?, channel(2)?],
            position,
        })
    }
}

impl fmt::Display for ColorStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.rgb;
        write!(f, "#{r:02x}{g:02x}{b:02x}")?;
        if let Some(position) = self.position {
            write!(f, "@{position}")?;
        }
        Ok(())
    }
}

impl Serialize for ColorStop {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColorStop {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Defaults {
    /// Filter spec applied when the CLI does not pass `--filter`.
    pub filter: Option<String>,
    pub surface: Option<SurfaceSize>,
    pub cache: Option<CacheSetting>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KernelEntry {
    /// Row-major 3x3 weights.
    pub weights: Vec<f32>,
    /// Divisor; defaults to the weight sum, or 1 when the sum is zero.
    #[serde(default)]
    pub weight: Option<f32>,
}

impl KernelEntry {
    pub fn weights_array(&self) -> Option<[f32; 9]> {
        self.weights.as_slice().try_into().ok()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaletteEntry {
    /// Strip width in texels; the renderer's default applies when absent.
    #[serde(default)]
    pub size: Option<u32>,
    pub stops: Vec<ColorStop>,
}

impl PaletteEntry {
    /// Stops with every position filled in. Missing positions are spread
    /// evenly between their positioned neighbours; the first and last stop
    /// default to 0 and 1.
    pub fn resolved_stops(&self) -> Vec<(f32, [u8; 3])> {
        let count = self.stops.len();
        let mut positions: Vec<Option<f32>> = self.stops.iter().map(|s| s.position).collect();
        if count == 1 {
            return vec![(positions[0].unwrap_or(0.0), self.stops[0].rgb)];
        }
        if let Some(first) = positions.first_mut() {
            first.get_or_insert(0.0);
        }
        if let Some(last) = positions.last_mut() {
            last.get_or_insert(1.0);
        }

        let mut anchor = 0;
        for index in 1..count {
            let Some(end) = positions[index] else {
                continue;
            };
            let start = positions[anchor].unwrap_or(0.0);
            let span = (index - anchor) as f32;
            for (step, slot) in positions[anchor + 1..index].iter_mut().enumerate() {
                *slot = Some(start + (end - start) * (step + 1) as f32 / span);
            }
            anchor = index;
        }

        positions
            .into_iter()
            .zip(&self.stops)
            .map(|(position, stop)| (position.unwrap_or(0.0), stop.rgb))
            .collect()
    }
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub kernels: BTreeMap<String, KernelEntry>,
    #[serde(default)]
    pub palettes: BTreeMap<String, PaletteEntry>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            version: 1,
            defaults: Defaults::default(),
            kernels: BTreeMap::new(),
            palettes: BTreeMap::new(),
        }
    }
}

impl FilterConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: FilterConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Like [`FilterConfig::from_path`], but a missing file is `Ok(None)`.
    pub fn from_path_if_exists(path: &Path) -> Result<Option<Self>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents).map(Some),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        for (name, kernel) in &self.kernels {
            validate_name("kernel", name)?;
            if kernel.weights.len() != 9 {
                return Err(ConfigError::Invalid(format!(
                    "kernel '{name}' must have 9 weights, found {}",
                    kernel.weights.len()
                )));
            }
            if kernel.weights.iter().any(|w| !w.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "kernel '{name}' weights must be finite"
                )));
            }
            if let Some(weight) = kernel.weight {
                if !weight.is_finite() || weight == 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "kernel '{name}' weight must be a non-zero number"
                    )));
                }
            }
        }

        for (name, palette) in &self.palettes {
            validate_name("palette", name)?;
            if palette.stops.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "palette '{name}' must contain at least one stop"
                )));
            }
            if palette
                .size
                .is_some_and(|size| size == 0 || size > MAX_PALETTE_SIZE)
            {
                return Err(ConfigError::Invalid(format!(
                    "palette '{name}' size must be within 1..={MAX_PALETTE_SIZE}"
                )));
            }
        }

        if let Some(filter) = &self.defaults.filter {
            if filter.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "defaults.filter may not be empty".into(),
                ));
            }
        }

        Ok(())
    }
}

fn validate_name(kind: &str, name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{kind} name '{name}' may only contain letters, digits, '-' and '_'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1

[defaults]
filter = "kernel:soften"
surface = "640x480"
cache = "disabled"

[kernels.soften]
weights = [1, 1, 1, 1, 2, 1, 1, 1, 1]
weight = 10

[kernels.ridge]
weights = [0, -1, 0, -1, 4, -1, 0, -1, 0]

[palettes.fire]
size = 16
stops = ["#000000", "#ff0000@0.5", "#ffff00"]
"##;

    #[test]
    fn parses_sample_config() {
        let config = FilterConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.defaults.filter.as_deref(), Some("kernel:soften"));
        assert_eq!(
            config.defaults.surface,
            Some(SurfaceSize {
                width: 640,
                height: 480
            })
        );
        assert_eq!(config.defaults.cache, Some(CacheSetting::Disabled));

        let soften = config.kernels.get("soften").unwrap();
        assert_eq!(soften.weight, Some(10.0));
        assert_eq!(soften.weights_array().unwrap()[4], 2.0);
        assert_eq!(config.kernels.get("ridge").unwrap().weight, None);

        let fire = config.palettes.get("fire").unwrap();
        assert_eq!(fire.size, Some(16));
        assert_eq!(fire.stops[1].rgb, [255, 0, 0]);
        assert_eq!(fire.stops[1].position, Some(0.5));
    }

    #[test]
    fn palette_size_is_optional_but_bounded() {
        let unsized_palette = FilterConfig::from_toml_str(
            r##"
version = 1
[palettes.plain]
stops = ["#000000"]
"##,
        )
        .unwrap();
        assert_eq!(unsized_palette.palettes["plain"].size, None);

        for size in [0, MAX_PALETTE_SIZE + 1] {
            let err = FilterConfig::from_toml_str(&format!(
                "version = 1\n[palettes.wide]\nsize = {size}\nstops = [\"#000000\"]\n"
            ))
            .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(message) if message.contains("size")));
        }
    }

    #[test]
    fn rejects_short_kernels() {
        let err = FilterConfig::from_toml_str(
            r#"
version = 1
[kernels.bad]
weights = [1, 2, 3]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("9 weights")));
    }

    #[test]
    fn rejects_bad_colors() {
        let err = FilterConfig::from_toml_str(
            r#"
version = 1
[palettes.bad]
stops = ["red"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = FilterConfig::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn spreads_unpositioned_stops() {
        let entry = PaletteEntry {
            size: None,
            stops: vec![
                "#000000".parse().unwrap(),
                "#111111".parse().unwrap(),
                "#222222".parse().unwrap(),
                "#ff0000@0.9".parse().unwrap(),
                "#ffffff".parse().unwrap(),
            ],
        };
        let positions: Vec<f32> = entry.resolved_stops().iter().map(|(p, _)| *p).collect();
        assert_eq!(positions.len(), 5);
        assert!((positions[1] - 0.3).abs() < 1e-6);
        assert!((positions[2] - 0.6).abs() < 1e-6);
        assert_eq!(positions[3], 0.9);
        assert_eq!(positions[4], 1.0);
        assert_eq!(entry.size, None);
    }

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(
            "800X600".parse::<SurfaceSize>().unwrap(),
            SurfaceSize {
                width: 800,
                height: 600
            }
        );
        assert!("800".parse::<SurfaceSize>().is_err());
        assert!("0x10".parse::<SurfaceSize>().is_err());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.toml");
        assert!(FilterConfig::from_path_if_exists(&missing).unwrap().is_none());

        fs::write(&missing, SAMPLE).unwrap();
        let loaded = FilterConfig::from_path_if_exists(&missing).unwrap().unwrap();
        assert!(loaded.palettes.get("fire").is_some());
    }
}

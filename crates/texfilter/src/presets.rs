use anyhow::{anyhow, Result};
use filterconfig::FilterConfig;
use renderer::filter::DEFAULT_PALETTE_SIZE;
use renderer::{FilterMode, FilterPresets, Kernel, Palette};
use serde::Serialize;

/// Built-in kernels and palettes merged with the user's config entries.
/// A config entry replaces the built-in of the same name in place.
pub fn load_presets(config: Option<&FilterConfig>) -> Result<FilterPresets> {
    let mut presets = FilterPresets::default();
    let Some(config) = config else {
        return Ok(presets);
    };

    for (name, entry) in &config.kernels {
        let weights = entry
            .weights_array()
            .ok_or_else(|| anyhow!("kernel '{name}' must have 9 weights"))?;
        let kernel = match entry.weight {
            Some(weight) => Kernel::with_weight(weights, weight),
            None => Kernel::new(weights),
        };
        match presets.kernels.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = kernel,
            None => presets.kernels.push((name.clone(), kernel)),
        }
    }

    for (name, entry) in &config.palettes {
        let size = entry.size.unwrap_or(DEFAULT_PALETTE_SIZE);
        let palette = Palette::from_stops(name.as_str(), &entry.resolved_stops(), size)
            .ok_or_else(|| anyhow!("palette '{name}' has no usable stops"))?;
        match presets.palettes.iter_mut().find(|p| p.name() == name) {
            Some(slot) => *slot = palette,
            None => presets.palettes.push(palette),
        }
    }

    tracing::debug!(
        kernels = presets.kernels.len(),
        palettes = presets.palettes.len(),
        "filter presets loaded"
    );
    Ok(presets)
}

/// Parses a filter spec: `none`, `grayscale`, `inverse`, `kernel:<name>`,
/// `kernel:w0,...,w8[/weight]` or `palette:<name>`.
pub fn parse_filter(spec: &str, presets: &FilterPresets) -> Result<FilterMode, String> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err("filter must not be empty".to_string());
    }

    let (kind, rest) = match trimmed.split_once(':') {
        Some((kind, rest)) => (kind.trim().to_ascii_lowercase(), Some(rest.trim())),
        None => (trimmed.to_ascii_lowercase(), None),
    };

    match (kind.as_str(), rest) {
        ("none" | "off", None) => Ok(FilterMode::None),
        ("grayscale" | "greyscale" | "gray", None) => Ok(FilterMode::Grayscale),
        ("inverse" | "invert", None) => Ok(FilterMode::Inverse),
        ("kernel", Some(value)) if !value.is_empty() => parse_kernel(value, presets),
        ("palette", Some(name)) if !name.is_empty() => presets
            .palettes
            .iter()
            .find(|palette| palette.name() == name)
            .map(|palette| FilterMode::ColorPalette(palette.clone()))
            .ok_or_else(|| {
                format!(
                    "unknown palette '{name}'; available: {}",
                    palette_names(presets).join(", ")
                )
            }),
        ("kernel" | "palette", _) => Err(format!("'{kind}' needs a value (e.g. {kind}:NAME)")),
        _ => Err(format!(
            "unknown filter '{trimmed}'; expected none, grayscale, inverse, kernel:..., or palette:..."
        )),
    }
}

fn parse_kernel(value: &str, presets: &FilterPresets) -> Result<FilterMode, String> {
    if let Some((_, kernel)) = presets.kernels.iter().find(|(name, _)| name == value) {
        return Ok(FilterMode::Kernel(*kernel));
    }
    if !value.contains(',') {
        return Err(format!(
            "unknown kernel '{value}'; available: {}",
            kernel_names(presets).join(", ")
        ));
    }

    let (weights, divisor) = match value.split_once('/') {
        Some((weights, divisor)) => (weights, Some(divisor)),
        None => (value, None),
    };
    let parsed: Vec<f32> = weights
        .split(',')
        .map(|w| {
            w.trim()
                .parse::<f32>()
                .ok()
                .filter(|w| w.is_finite())
                .ok_or_else(|| format!("invalid kernel weight '{}'", w.trim()))
        })
        .collect::<Result<_, _>>()?;
    let weights: [f32; 9] = parsed
        .as_slice()
        .try_into()
        .map_err(|_| format!("kernel needs 9 weights, found {}", parsed.len()))?;

    match divisor {
        None => Ok(FilterMode::Kernel(Kernel::new(weights))),
        Some(raw) => {
            let weight = raw
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|w| w.is_finite() && *w != 0.0)
                .ok_or_else(|| format!("invalid kernel weight divisor '{}'", raw.trim()))?;
            Ok(FilterMode::Kernel(Kernel::with_weight(weights, weight)))
        }
    }
}

fn kernel_names(presets: &FilterPresets) -> Vec<&str> {
    presets.kernels.iter().map(|(name, _)| name.as_str()).collect()
}

fn palette_names(presets: &FilterPresets) -> Vec<&str> {
    presets.palettes.iter().map(|palette| palette.name()).collect()
}

#[derive(Debug, Serialize)]
struct KernelListing<'a> {
    name: &'a str,
    weights: [f32; 9],
    weight: f32,
}

#[derive(Debug, Serialize)]
struct PaletteListing<'a> {
    name: &'a str,
    size: u32,
}

#[derive(Debug, Serialize)]
struct PresetListing<'a> {
    kernels: Vec<KernelListing<'a>>,
    palettes: Vec<PaletteListing<'a>>,
}

/// Renders the preset list for `texfilter presets`.
pub fn describe_presets(presets: &FilterPresets, json: bool) -> Result<String> {
    if json {
        let listing = PresetListing {
            kernels: presets
                .kernels
                .iter()
                .map(|(name, kernel)| KernelListing {
                    name: name.as_str(),
                    weights: *kernel.weights(),
                    weight: kernel.weight(),
                })
                .collect(),
            palettes: presets
                .palettes
                .iter()
                .map(|palette| PaletteListing {
                    name: palette.name(),
                    size: palette.width(),
                })
                .collect(),
        };
        return Ok(serde_json::to_string_pretty(&listing)?);
    }

    let mut out = String::from("Kernels:\n");
    for (name, kernel) in &presets.kernels {
        out.push_str(&format!("  {name:<18} {kernel}\n"));
    }
    out.push_str("Palettes:\n");
    for palette in &presets.palettes {
        out.push_str(&format!("  {:<18} {} texels\n", palette.name(), palette.width()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> FilterConfig {
        FilterConfig::from_toml_str(toml).unwrap()
    }

    #[test]
    fn simple_modes_parse() {
        let presets = FilterPresets::default();
        assert_eq!(parse_filter("none", &presets).unwrap(), FilterMode::None);
        assert_eq!(parse_filter(" Grayscale ", &presets).unwrap(), FilterMode::Grayscale);
        assert_eq!(parse_filter("inverse", &presets).unwrap(), FilterMode::Inverse);
    }

    #[test]
    fn named_kernel_resolves_from_presets() {
        let presets = FilterPresets::default();
        assert_eq!(
            parse_filter("kernel:box-blur", &presets).unwrap(),
            FilterMode::Kernel(Kernel::box_blur())
        );
        assert!(parse_filter("kernel:nope", &presets)
            .unwrap_err()
            .contains("unknown kernel"));
    }

    #[test]
    fn inline_kernel_with_and_without_divisor() {
        let presets = FilterPresets::default();
        let parsed = parse_filter("kernel:0,0,0,0,2,0,0,0,0", &presets).unwrap();
        let FilterMode::Kernel(kernel) = parsed else {
            panic!("expected a kernel");
        };
        assert_eq!(kernel.weight(), 2.0);

        let parsed = parse_filter("kernel:1,1,1,1,1,1,1,1,1/3", &presets).unwrap();
        let FilterMode::Kernel(kernel) = parsed else {
            panic!("expected a kernel");
        };
        assert_eq!(kernel.weight(), 3.0);
    }

    #[test]
    fn inline_kernel_errors_are_reported() {
        let presets = FilterPresets::default();
        assert!(parse_filter("kernel:1,2,3", &presets)
            .unwrap_err()
            .contains("9 weights"));
        assert!(parse_filter("kernel:1,1,1,1,1,1,1,1,x", &presets).is_err());
        assert!(parse_filter("kernel:1,1,1,1,1,1,1,1,1/0", &presets).is_err());
        assert!(parse_filter("kernel:", &presets).is_err());
    }

    #[test]
    fn palette_lookup_and_unknown_filters() {
        let presets = FilterPresets::default();
        match parse_filter("palette:heat", &presets).unwrap() {
            FilterMode::ColorPalette(palette) => assert_eq!(palette.name(), "heat"),
            other => panic!("unexpected filter {other:?}"),
        }
        assert!(parse_filter("palette:plaid", &presets).is_err());
        assert!(parse_filter("sepia", &presets).is_err());
        assert!(parse_filter("", &presets).is_err());
    }

    #[test]
    fn config_entries_extend_and_override_builtins() {
        let cfg = config(
            r##"
version = 1

[kernels.soften]
weights = [1, 1, 1, 1, 2, 1, 1, 1, 1]
weight = 10

[kernels.box-blur]
weights = [0, 0, 0, 0, 1, 0, 0, 0, 0]

[palettes.heat]
size = 2
stops = ["#000000", "#ffffff"]
"##,
        );
        let builtin = FilterPresets::default();
        let presets = load_presets(Some(&cfg)).unwrap();

        assert_eq!(presets.kernels.len(), builtin.kernels.len() + 1);
        let soften = parse_filter("kernel:soften", &presets).unwrap();
        assert_eq!(
            soften,
            FilterMode::Kernel(Kernel::with_weight(
                [1.0, 1.0, 1.0, 1.0, 2.0, 1.0, 1.0, 1.0, 1.0],
                10.0
            ))
        );
        assert_eq!(
            parse_filter("kernel:box-blur", &presets).unwrap(),
            FilterMode::Kernel(Kernel::identity())
        );

        assert_eq!(presets.palettes.len(), builtin.palettes.len());
        let heat = presets.palettes.iter().find(|p| p.name() == "heat").unwrap();
        assert_eq!(heat.width(), 2);
    }

    #[test]
    fn unsized_config_palette_uses_renderer_default() {
        let cfg = config(
            r##"
version = 1

[palettes.dusk]
stops = ["#102030", "#f0a060"]
"##,
        );
        let presets = load_presets(Some(&cfg)).unwrap();
        let dusk = presets.palettes.iter().find(|p| p.name() == "dusk").unwrap();
        assert_eq!(dusk.width(), DEFAULT_PALETTE_SIZE);
    }

    #[test]
    fn without_config_only_builtins_are_listed() {
        let presets = load_presets(None).unwrap();
        let text = describe_presets(&presets, false).unwrap();
        assert!(text.contains("gaussian"));
        assert!(text.contains("sepia"));

        let json: serde_json::Value =
            serde_json::from_str(&describe_presets(&presets, true).unwrap()).unwrap();
        assert_eq!(json["palettes"][0]["name"], "grayscale");
        assert_eq!(json["kernels"][0]["name"], "identity");
    }
}

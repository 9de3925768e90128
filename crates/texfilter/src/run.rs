use anyhow::{anyhow, Context, Result};
use filterconfig::{CacheSetting, FilterConfig};
use renderer::{CacheMode, FilterMode, RenderMode, Renderer, RendererConfig, DEFAULT_SURFACE_SIZE};
use tracing_subscriber::EnvFilter;

use crate::cli::{PresetsArgs, RunArgs};
use crate::paths::ConfigLocation;
use crate::presets::{describe_presets, load_presets, parse_filter};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let location = ConfigLocation::resolve(args.config.as_deref());
    let config = location.load()?;
    if let (Some(path), Some(_)) = (location.path(), config.as_ref()) {
        tracing::info!(path = %path.display(), "loaded filter config");
    }

    let renderer_config = build_renderer_config(&args, config.as_ref())?;
    tracing::debug!(
        image = ?renderer_config.image,
        size = ?renderer_config.surface_size,
        filter = %renderer_config.filter,
        cache = %renderer_config.cache_mode,
        "resolved texfilter configuration"
    );

    let mut renderer = Renderer::new(renderer_config);
    renderer.run()
}

pub fn list_presets(args: PresetsArgs) -> Result<()> {
    let config = ConfigLocation::resolve(args.config.as_deref()).load()?;
    let presets = load_presets(config.as_ref())?;
    print!("{}", describe_presets(&presets, args.json)?);
    if args.json {
        println!();
    }
    Ok(())
}

/// Combines CLI flags with config defaults. Flags win over `[defaults]`.
pub fn build_renderer_config(
    args: &RunArgs,
    config: Option<&FilterConfig>,
) -> Result<RendererConfig> {
    let defaults = config.map(|config| &config.defaults);
    let presets = load_presets(config)?;

    let filter = match args
        .filter
        .as_deref()
        .or_else(|| defaults.and_then(|d| d.filter.as_deref()))
    {
        Some(spec) => parse_filter(spec, &presets)
            .map_err(|err| anyhow!(err))
            .with_context(|| format!("invalid filter '{spec}'"))?,
        None => FilterMode::None,
    };

    let surface_size = args
        .size
        .or_else(|| defaults.and_then(|d| d.surface))
        .map(|size| (size.width, size.height))
        .unwrap_or(DEFAULT_SURFACE_SIZE);

    let cache_mode = args
        .cache
        .or_else(|| {
            defaults.and_then(|d| d.cache).map(|setting| match setting {
                CacheSetting::OnDemand => CacheMode::OnDemand,
                CacheSetting::Disabled => CacheMode::Disabled,
            })
        })
        .unwrap_or_default();

    let mode = match &args.export {
        Some(path) => {
            if args.image.is_none() {
                return Err(anyhow!("--export needs an IMAGE to filter"));
            }
            RenderMode::Export { path: path.clone() }
        }
        None => RenderMode::Windowed,
    };

    Ok(RendererConfig {
        surface_size,
        image: args.image.clone(),
        filter,
        mode,
        cache_mode,
        presets,
        ..RendererConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    fn args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["texfilter"];
        full.extend_from_slice(argv);
        Cli::try_parse_from(full).unwrap().run
    }

    fn config() -> FilterConfig {
        FilterConfig::from_toml_str(
            r##"
version = 1

[defaults]
filter = "palette:warm"
surface = "64x32"
cache = "disabled"

[palettes.warm]
stops = ["#200000", "#ffc080"]
"##,
        )
        .unwrap()
    }

    #[test]
    fn defaults_without_config() {
        let resolved = build_renderer_config(&args(&[]), None).unwrap();
        assert_eq!(resolved.surface_size, DEFAULT_SURFACE_SIZE);
        assert_eq!(resolved.filter, FilterMode::None);
        assert_eq!(resolved.cache_mode, CacheMode::OnDemand);
        assert_eq!(resolved.mode, RenderMode::Windowed);
    }

    #[test]
    fn config_defaults_apply_when_flags_are_absent() {
        let cfg = config();
        let resolved = build_renderer_config(&args(&["in.png"]), Some(&cfg)).unwrap();
        assert_eq!(resolved.surface_size, (64, 32));
        assert_eq!(resolved.cache_mode, CacheMode::Disabled);
        match resolved.filter {
            FilterMode::ColorPalette(palette) => assert_eq!(palette.name(), "warm"),
            other => panic!("unexpected filter {other}"),
        }
    }

    #[test]
    fn flags_override_config_defaults() {
        let cfg = config();
        let resolved = build_renderer_config(
            &args(&[
                "in.png",
                "--filter",
                "inverse",
                "--size",
                "10x10",
                "--cache",
                "on-demand",
                "--export",
                "out.png",
            ]),
            Some(&cfg),
        )
        .unwrap();
        assert_eq!(resolved.filter, FilterMode::Inverse);
        assert_eq!(resolved.surface_size, (10, 10));
        assert_eq!(resolved.cache_mode, CacheMode::OnDemand);
        assert_eq!(
            resolved.mode,
            RenderMode::Export {
                path: "out.png".into()
            }
        );
    }

    #[test]
    fn export_without_image_is_rejected() {
        let err = build_renderer_config(&args(&["--export", "out.png"]), None).unwrap_err();
        assert!(err.to_string().contains("IMAGE"));
    }

    #[test]
    fn bad_filter_reports_the_spec() {
        let err = build_renderer_config(&args(&["--filter", "blurry"]), None).unwrap_err();
        assert!(err.to_string().contains("blurry"));
    }
}

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use filterconfig::SurfaceSize;
use renderer::CacheMode;

#[derive(Parser, Debug)]
#[command(
    name = "texfilter",
    author,
    version,
    about = "GPU image filters: grayscale, inverse, 3x3 kernels and palettes",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Image to filter. The preview window also accepts dropped files.
    #[arg(value_name = "IMAGE")]
    pub image: Option<PathBuf>,

    /// Filter spec: `none`, `grayscale`, `inverse`, `kernel:NAME`,
    /// `kernel:w0,...,w8[/weight]` or `palette:NAME`.
    #[arg(long, short = 'f', value_name = "SPEC")]
    pub filter: Option<String>,

    /// Configuration file with kernel and palette presets.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output surface size (e.g. `800x600`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<SurfaceSize>,

    /// Render once without a window, write the result to this PNG and exit.
    #[arg(long, value_name = "PATH", value_parser = parse_export_path)]
    pub export: Option<PathBuf>,

    /// Resource caching between renders: `on-demand` or `disabled`.
    #[arg(long, value_name = "MODE", value_parser = parse_cache_mode)]
    pub cache: Option<CacheMode>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the available kernels and palettes, including config entries.
    Presets(PresetsArgs),
}

#[derive(Parser, Debug)]
pub struct PresetsArgs {
    /// Configuration file with kernel and palette presets.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<SurfaceSize, String> {
    if value.trim().is_empty() {
        return Err("size must not be empty".to_string());
    }
    value.parse()
}

pub fn parse_cache_mode(value: &str) -> Result<CacheMode, String> {
    if value.trim().is_empty() {
        return Err("cache mode must not be empty".to_string());
    }
    value.parse()
}

pub fn parse_export_path(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value.trim());
    match extension(&path).as_deref() {
        Some("png") => Ok(path),
        None => Err("export path has no extension; expected .png".to_string()),
        Some(other) => Err(format!(
            "unsupported export format '.{other}'; expected .png"
        )),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

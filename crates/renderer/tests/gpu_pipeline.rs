//! End-to-end checks against a real adapter. Run with `cargo test -- --ignored`
//! on a machine with a GPU or a software adapter such as lavapipe.

use std::borrow::Cow;

use image::{Rgba, RgbaImage};
use renderer::filter::reference;
use renderer::{
    CacheMode, FilterMode, FrameOrchestrator, FrameState, GpuContext, Kernel, Palette,
    RenderError, RenderOutcome, Session, ShaderSources, SourceImage, StageKind,
};

const SIZE: (u32, u32) = (16, 12);

fn gradient_image(width: u32, height: u32) -> SourceImage {
    let pixels = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) * 7 % 256) as u8,
            255,
        ])
    });
    SourceImage::from_rgba8(pixels).unwrap()
}

fn orchestrator(cache_mode: CacheMode) -> FrameOrchestrator {
    let context = GpuContext::headless().expect("no GPU adapter available");
    FrameOrchestrator::new(context, SIZE, ShaderSources::default(), cache_mode).unwrap()
}

fn assert_close(actual: &RgbaImage, expected: &RgbaImage) {
    assert_eq!(actual.dimensions(), expected.dimensions());
    for (x, y, pixel) in actual.enumerate_pixels() {
        let want = expected.get_pixel(x, y);
        for channel in 0..4 {
            let diff = (pixel[channel] as i32 - want[channel] as i32).abs();
            assert!(
                diff <= 1,
                "pixel ({x},{y}) channel {channel}: got {:?}, want {:?}",
                pixel.0,
                want.0
            );
        }
    }
}

#[test]
#[ignore = "requires a GPU adapter"]
fn gpu_output_matches_cpu_reference() {
    let image = gradient_image(SIZE.0, SIZE.1);
    let mut orchestrator = orchestrator(CacheMode::OnDemand);
    let filters = [
        FilterMode::None,
        FilterMode::Grayscale,
        FilterMode::Inverse,
        FilterMode::Kernel(Kernel::box_blur()),
        FilterMode::Kernel(Kernel::new([
            -1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0,
        ])),
        FilterMode::ColorPalette(Palette::grayscale_ramp()),
    ];

    for filter in filters {
        assert_eq!(
            orchestrator.render(&image, &filter).unwrap(),
            RenderOutcome::Drawn
        );
        let expected = reference::quantize(&reference::apply(&image, &filter));
        assert_close(&orchestrator.read_back().unwrap(), &expected);
    }
    assert_eq!(orchestrator.draw_count(), 6);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn broken_shader_leaves_surface_untouched() {
    let image = gradient_image(SIZE.0, SIZE.1);
    let mut orchestrator = orchestrator(CacheMode::OnDemand);
    orchestrator.render(&image, &FilterMode::Inverse).unwrap();
    let before = orchestrator.read_back().unwrap();

    orchestrator.set_shaders(ShaderSources {
        fragment: Cow::Borrowed("#version 450\nvoid main( {"),
        ..ShaderSources::default()
    });
    let err = orchestrator
        .render(&image, &FilterMode::Grayscale)
        .unwrap_err();

    assert!(matches!(
        err,
        RenderError::ShaderCompile {
            stage: StageKind::Fragment,
            ..
        }
    ));
    assert_eq!(orchestrator.state(), FrameState::Failed);
    assert_eq!(orchestrator.draw_count(), 1);
    assert_eq!(orchestrator.read_back().unwrap(), before);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn render_without_image_binds_nothing() {
    let mut orchestrator = orchestrator(CacheMode::OnDemand);
    let session = Session::default();

    assert!(matches!(
        session.render(&mut orchestrator),
        Err(RenderError::NoImage)
    ));
    assert_eq!(orchestrator.state(), FrameState::Idle);
    assert_eq!(orchestrator.draw_count(), 0);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn repeated_request_is_skipped_only_when_caching() {
    let image = gradient_image(SIZE.0, SIZE.1);

    let mut cached = orchestrator(CacheMode::OnDemand);
    assert_eq!(
        cached.render(&image, &FilterMode::Grayscale).unwrap(),
        RenderOutcome::Drawn
    );
    assert_eq!(
        cached.render(&image, &FilterMode::Grayscale).unwrap(),
        RenderOutcome::Unchanged
    );
    assert_eq!(cached.draw_count(), 1);

    let mut uncached = orchestrator(CacheMode::Disabled);
    uncached.render(&image, &FilterMode::Grayscale).unwrap();
    assert_eq!(
        uncached.render(&image, &FilterMode::Grayscale).unwrap(),
        RenderOutcome::Drawn
    );
    assert_eq!(uncached.draw_count(), 2);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn export_writes_the_surface() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    let image = gradient_image(SIZE.0, SIZE.1);
    let mut orchestrator = orchestrator(CacheMode::OnDemand);
    orchestrator
        .render(&image, &FilterMode::Kernel(Kernel::identity()))
        .unwrap();

    orchestrator.export_png(&path).unwrap();

    let written = image::open(&path).unwrap().to_rgba8();
    assert_eq!(written, orchestrator.read_back().unwrap());
    assert_close(&written, image.pixels());
}

#[test]
#[ignore = "requires a GPU adapter"]
fn oversized_image_is_rejected_before_upload() {
    let mut orchestrator = orchestrator(CacheMode::OnDemand);
    let max = orchestrator.context().profile.max_texture_dimension;
    let wide = SourceImage::from_raw(max + 1, 1, vec![0; (max as usize + 1) * 4]).unwrap();

    // A second attempt must not find a half-built texture in the cache.
    for _ in 0..2 {
        let err = orchestrator.render(&wide, &FilterMode::Grayscale).unwrap_err();
        assert!(matches!(
            err,
            RenderError::TextureTooLarge { width, height: 1, max: limit }
                if width == max + 1 && limit == max
        ));
        assert_eq!(orchestrator.state(), FrameState::Failed);
    }
    assert_eq!(orchestrator.draw_count(), 0);

    let image = gradient_image(SIZE.0, SIZE.1);
    assert_eq!(
        orchestrator.render(&image, &FilterMode::Grayscale).unwrap(),
        RenderOutcome::Drawn
    );
    assert_eq!(orchestrator.draw_count(), 1);
}

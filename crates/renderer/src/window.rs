use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use tracing::{error, info, warn};

use crate::filter::FilterMode;
use crate::gpu::{FrameOrchestrator, GpuContext, Presenter, RenderOutcome};
use crate::session::{LoadEvent, Session};
use crate::types::{FilterPresets, RendererConfig};

/// Events injected into the preview event loop from other threads.
#[derive(Debug, Clone, Copy)]
enum UserEvent {
    ImageDecoded,
}

/// Action bound to a key in the preview window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyCommand {
    Select(FilterKind),
    NextKernel,
    NextPalette,
    Export,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    None,
    Grayscale,
    Inverse,
}

fn command_for_key(key: &Key) -> Option<KeyCommand> {
    match key {
        Key::Named(NamedKey::Escape) => Some(KeyCommand::Quit),
        Key::Character(value) => match value.to_ascii_lowercase().as_str() {
            "0" => Some(KeyCommand::Select(FilterKind::None)),
            "1" => Some(KeyCommand::Select(FilterKind::Grayscale)),
            "2" => Some(KeyCommand::Select(FilterKind::Inverse)),
            "3" => Some(KeyCommand::NextKernel),
            "4" => Some(KeyCommand::NextPalette),
            "e" => Some(KeyCommand::Export),
            "q" => Some(KeyCommand::Quit),
            _ => None,
        },
        _ => None,
    }
}

/// Walks the preset lists. The first press of `3`/`4` picks entry 0.
#[derive(Debug)]
struct FilterCycler {
    presets: FilterPresets,
    kernel: Option<usize>,
    palette: Option<usize>,
}

impl FilterCycler {
    fn new(presets: FilterPresets) -> Self {
        Self {
            presets,
            kernel: None,
            palette: None,
        }
    }

    fn next_kernel(&mut self) -> Option<FilterMode> {
        let len = self.presets.kernels.len();
        if len == 0 {
            return None;
        }
        let index = self.kernel.map_or(0, |current| (current + 1) % len);
        self.kernel = Some(index);
        let (name, kernel) = &self.presets.kernels[index];
        info!(kernel = %name, "kernel selected");
        Some(FilterMode::Kernel(*kernel))
    }

    fn next_palette(&mut self) -> Option<FilterMode> {
        let len = self.presets.palettes.len();
        if len == 0 {
            return None;
        }
        let index = self.palette.map_or(0, |current| (current + 1) % len);
        self.palette = Some(index);
        let palette = self.presets.palettes[index].clone();
        info!(palette = %palette.name(), "palette selected");
        Some(FilterMode::ColorPalette(palette))
    }
}

/// Aggregates GPU state for the windowed preview path.
struct WindowState {
    presenter: Presenter,
    orchestrator: FrameOrchestrator,
    session: Session,
    cycler: FilterCycler,
    last_error: Option<String>,
    window: Arc<Window>,
}

impl WindowState {
    fn new(window: Arc<Window>, config: &RendererConfig, session: Session) -> Result<Self> {
        let (context, surface) = GpuContext::with_surface(window.as_ref())?;
        let orchestrator = FrameOrchestrator::new(
            context,
            config.surface_size,
            config.shaders.clone(),
            config.cache_mode,
        )?;
        let presenter = Presenter::new(
            orchestrator.context(),
            surface,
            window.inner_size(),
            orchestrator.output(),
        )?;
        Ok(Self {
            presenter,
            orchestrator,
            session,
            cycler: FilterCycler::new(config.presets.clone()),
            last_error: None,
            window,
        })
    }

    fn window(&self) -> &Window {
        self.window.as_ref()
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.presenter.resize(self.orchestrator.context(), new_size);
    }

    /// Renders the session into the output surface and asks for a redraw.
    fn refresh(&mut self) {
        if self.session.image().is_none() {
            self.update_title();
            return;
        }
        match self.session.render(&mut self.orchestrator) {
            Ok(RenderOutcome::Drawn) => self.last_error = None,
            Ok(RenderOutcome::Unchanged) => {}
            Err(err) => self.last_error = Some(first_line(&err.to_string())),
        }
        self.update_title();
        self.window().request_redraw();
    }

    fn handle_command(&mut self, command: KeyCommand) -> bool {
        let filter = match command {
            KeyCommand::Quit => return false,
            KeyCommand::Export => {
                self.export();
                return true;
            }
            KeyCommand::Select(FilterKind::None) => Some(FilterMode::None),
            KeyCommand::Select(FilterKind::Grayscale) => Some(FilterMode::Grayscale),
            KeyCommand::Select(FilterKind::Inverse) => Some(FilterMode::Inverse),
            KeyCommand::NextKernel => self.cycler.next_kernel(),
            KeyCommand::NextPalette => self.cycler.next_palette(),
        };
        if let Some(filter) = filter {
            self.session.set_filter(filter);
            self.refresh();
        }
        true
    }

    fn handle_loads(&mut self) {
        for event in self.session.poll_loads() {
            match event {
                LoadEvent::Loaded { id, .. } => info!(%id, "image ready"),
                LoadEvent::Failed { error, .. } => {
                    self.last_error = Some(first_line(&error.to_string()));
                }
                LoadEvent::Superseded { .. } => {}
            }
        }
        self.refresh();
    }

    fn export(&mut self) {
        if self.session.image().is_none() {
            warn!("nothing to export yet");
            return;
        }
        let path = PathBuf::from(Local::now().format("texfilter-%Y%m%d-%H%M%S.png").to_string());
        match self.orchestrator.export_png(&path) {
            Ok(()) => info!("exported {}", path.display()),
            Err(err) => {
                error!(error = %err, "export failed");
                self.last_error = Some(first_line(&err.to_string()));
                self.update_title();
            }
        }
    }

    fn update_title(&self) {
        let mut title = String::from("texfilter");
        match self.session.image() {
            Some(image) => {
                let (width, height) = image.dimensions();
                title.push_str(&format!(" - {} - {width}x{height}", self.session.filter()));
            }
            None => title.push_str(" - drop an image here"),
        }
        if let Some(err) = &self.last_error {
            title.push_str(&format!(" - error: {err}"));
        }
        self.window().set_title(&title);
    }
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}

/// Runs the preview window on the calling thread until it is closed.
pub(crate) fn run_window(config: RendererConfig) -> Result<()> {
    let event_loop = EventLoopBuilder::<UserEvent>::with_user_event()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let proxy = event_loop.create_proxy();

    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title("texfilter")
        .with_inner_size(window_size)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let mut session = Session::new(config.filter.clone()).with_notifier(Box::new(move || {
        let _ = proxy.send_event(UserEvent::ImageDecoded);
    }));
    if let Some(path) = config.image.as_deref() {
        session
            .load(path)
            .with_context(|| format!("failed to queue {}", path.display()))?;
    }

    let mut state = WindowState::new(window, &config, session)
        .context("failed to initialise window renderer")?;
    state.update_title();

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);
            match event {
                Event::UserEvent(UserEvent::ImageDecoded) => state.handle_loads(),
                Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                        WindowEvent::KeyboardInput { event, .. } => {
                            if event.state != ElementState::Pressed || event.repeat {
                                return;
                            }
                            if let Some(command) = command_for_key(&event.logical_key) {
                                if !state.handle_command(command) {
                                    elwt.exit();
                                }
                            }
                        }
                        WindowEvent::DroppedFile(path) => {
                            if let Err(err) = state.session.load(&path) {
                                error!(error = %err, "failed to queue dropped file");
                            }
                        }
                        WindowEvent::Resized(new_size) => {
                            state.resize(new_size);
                            state.window().request_redraw();
                        }
                        WindowEvent::RedrawRequested => {
                            match state.presenter.present(state.orchestrator.context()) {
                                Ok(()) => {}
                                Err(wgpu::SurfaceError::OutOfMemory) => {
                                    error!("surface out of memory; exiting preview");
                                    elwt.exit();
                                }
                                Err(err) => warn!("surface error: {err:?}; retrying next frame"),
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}

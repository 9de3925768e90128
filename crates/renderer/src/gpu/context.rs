use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{RenderError, RenderResult};

/// Adapter details kept for logging and the window title.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension: u32,
}

impl AdapterProfile {
    fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

/// Device and queue shared by every render of the session.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::Adapter,
    pub profile: AdapterProfile,
}

impl GpuContext {
    /// Creates a context without a presentation surface (export and tests).
    pub fn headless() -> RenderResult<Self> {
        let instance = create_instance();
        Self::from_instance(instance, None)
    }

    /// Creates a context together with a surface for `target`. The caller must
    /// keep `target` alive for as long as the surface.
    pub(crate) fn with_surface<T>(target: &T) -> RenderResult<(Self, wgpu::Surface<'static>)>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = create_instance();

        let window_handle = target
            .window_handle()
            .map_err(|err| RenderError::Gpu(format!("failed to acquire window handle: {err}")))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| RenderError::Gpu(format!("failed to acquire display handle: {err}")))?;

        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .map_err(|err| RenderError::Gpu(format!("failed to create rendering surface: {err}")))?;

        let context = Self::from_instance(instance, Some(&surface))?;
        Ok((context, surface))
    }

    fn from_instance(
        instance: wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> RenderResult<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface,
            force_fallback_adapter: false,
        }))
        .map_err(|err| RenderError::Gpu(format!("failed to find a suitable GPU adapter: {err}")))?;

        let info = adapter.get_info();
        let limits = adapter.limits();
        let profile = AdapterProfile::from_wgpu(&info, &limits);
        tracing::debug!(
            name = %profile.name,
            backend = ?profile.backend,
            device_type = ?profile.device_type,
            is_software = profile.is_software(),
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("texfilter device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(limits),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| RenderError::Gpu(format!("failed to create GPU device: {err}")))?;

        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!(%error, "uncaptured wgpu error");
        }));

        Ok(Self {
            instance,
            device,
            queue,
            adapter,
            profile,
        })
    }

    /// Rejects textures the device cannot allocate.
    pub fn check_dimensions(&self, width: u32, height: u32) -> RenderResult<()> {
        let max = self.profile.max_texture_dimension;
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyImage { width, height });
        }
        if width > max || height > max {
            return Err(RenderError::TextureTooLarge { width, height, max });
        }
        Ok(())
    }

    /// Runs `f` inside a validation error scope and reports anything the
    /// device rejected as [`RenderError::Pipeline`].
    pub(crate) fn validated<R>(&self, f: impl FnOnce(&wgpu::Device) -> R) -> RenderResult<R> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(RenderError::Pipeline(error.to_string())),
            None => Ok(value),
        }
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;
use log::{error, info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Fullscreen, Window, WindowId};

use cube_showcase::frame::{ManualClock, SchedulerError};
use cube_showcase::{
    parse_assignment, AssetLoader, ClickTracker, DirectorySource, FrameScheduler, FullscreenApi,
    GpuBackend, HeadlessBackend, MouseButton, PanelSchema, Showcase, ShowcaseConfig, SystemClock,
    TimeSource, Viewport,
};

/// Interactive 3D product showcase.
#[derive(Debug, Parser)]
#[command(name = "cube-showcase", version)]
struct Cli {
    /// Directory that asset and texture paths are relative to.
    #[arg(default_value = ".")]
    root: PathBuf,
    /// XML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Model to load, overriding the configuration.
    #[arg(long)]
    asset: Option<String>,
    /// Initial parameter value, e.g. `--set bloomStrength=1.2`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
    /// Render without a window and print what each frame drew.
    #[arg(long)]
    headless: bool,
    /// Number of frames to render in headless mode.
    #[arg(long, default_value_t = 1)]
    frames: u64,
    /// Logical width of the window or headless target.
    #[arg(long, default_value_t = 1280)]
    width: u32,
    /// Logical height of the window or headless target.
    #[arg(long, default_value_t = 720)]
    height: u32,
    /// Print frame records as JSON lines in headless mode.
    #[arg(long)]
    json: bool,
    /// Print the configuration panel schema as JSON and exit.
    #[arg(long)]
    print_panel: bool,
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_panel {
        let schema = PanelSchema::standard()
            .to_json()
            .context("failed to serialize the panel schema")?;
        println!("{schema}");
        return Ok(());
    }

    let config = load_config(&cli)?;
    if cli.headless {
        return run_headless(&cli, &config);
    }

    match run_interactive(&cli, &config) {
        Ok(()) => Ok(()),
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!("{err}. Falling back to --headless mode.");
            run_headless(&cli, &config)
        }
        Err(err) => Err(err),
    }
}

fn load_config(cli: &Cli) -> Result<ShowcaseConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let xml = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ShowcaseConfig::from_xml(&xml)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => ShowcaseConfig::default(),
    };
    if let Some(asset) = &cli.asset {
        config.asset = asset.clone();
    }
    for assignment in &cli.set {
        let parameter = parse_assignment(assignment)
            .with_context(|| format!("invalid --set {assignment}"))?;
        config.parameters.push(parameter);
    }
    Ok(config)
}

/// Creates the context, applies the initial parameters and attaches the
/// product. A product that fails to load is logged; the session goes on
/// without it.
fn prepare<B: cube_showcase::RenderBackend>(
    backend: B,
    viewport: Viewport,
    root: &Path,
    config: &ShowcaseConfig,
) -> Result<Showcase<B>> {
    let mut showcase = Showcase::new(backend, viewport, config);
    showcase
        .apply_config(config)
        .context("failed to apply initial parameters")?;

    let loader = AssetLoader::new(DirectorySource::new(root));
    match block_on(showcase.load_product(&loader, config)) {
        Ok(product) => {
            let roles: Vec<_> = product.parts.iter().map(|part| part.role.as_str()).collect();
            println!("Loaded {} with parts: {}", config.asset, roles.join(", "));
        }
        Err(err) => {
            error!("failed to load product: {err}");
            println!("No product attached");
        }
    }
    Ok(showcase)
}

fn run_headless(cli: &Cli, config: &ShowcaseConfig) -> Result<()> {
    let viewport = Viewport::new(cli.width, cli.height, 1.0);
    let backend = HeadlessBackend::new(cli.width, cli.height);
    let mut showcase = prepare(backend, viewport, &cli.root, config)?;

    let clock = ManualClock::new(0.0);
    let mut scheduler = FrameScheduler::new(&clock);
    scheduler.request();
    for _ in 0..cli.frames {
        scheduler.run_tick(&mut showcase)?;
        if cli.json {
            if let Some(record) = showcase.pipeline().backend().last_frame() {
                println!("{}", serde_json::to_string(record)?);
            }
        }
        clock.advance(1.0 / 60.0);
    }

    let backend = showcase.pipeline().backend();
    if let Some(record) = backend.last_frame().filter(|_| !cli.json) {
        let passes: Vec<_> = record.passes.iter().map(ToString::to_string).collect();
        println!(
            "Rendered {} frame(s) at {}x{}: passes {}, {} draw call(s) ({} blended), exposure {}",
            backend.frames(),
            record.width,
            record.height,
            passes.join(" -> "),
            record.draw_calls,
            record.blended_draw_calls,
            record.exposure
        );
    }
    Ok(())
}

fn run_interactive(cli: &Cli, config: &ShowcaseConfig) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp {
        root: cli.root.clone(),
        config: config.clone(),
        size: LogicalSize::new(cli.width, cli.height),
        running: None,
        error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("event loop terminated abnormally")?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct ViewerApp {
    root: PathBuf,
    config: ShowcaseConfig,
    size: LogicalSize<u32>,
    running: Option<Running>,
    error: Option<anyhow::Error>,
}

struct Running {
    window: Arc<Window>,
    showcase: Showcase<GpuBackend>,
    scheduler: FrameScheduler<SystemClock>,
    clicks: ClickTracker,
}

impl ViewerApp {
    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let attributes = Window::default_attributes()
            .with_title("Cube Showcase")
            .with_inner_size(self.size);
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );

        let scale = window.scale_factor();
        let logical = window.inner_size().to_logical::<u32>(scale);
        let viewport = Viewport::new(logical.width, logical.height, scale as f32);
        let (width, height) = viewport.physical_size();
        let backend = block_on(GpuBackend::new(Arc::clone(&window), width, height))?;
        let showcase = prepare(backend, viewport, &self.root, &self.config)?;

        let mut scheduler = FrameScheduler::new(SystemClock::default());
        scheduler.request();
        info!("window ready at {}x{} (scale {scale})", logical.width, logical.height);
        Ok(Running {
            window,
            showcase,
            scheduler,
            clicks: ClickTracker::default(),
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.error = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => self.running = Some(running),
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if window_id != running.window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                running.resize();
            }
            WindowEvent::Focused(false) => running.showcase.pointer().release_all(),
            WindowEvent::CursorMoved { position, .. } => {
                let logical = position.to_logical::<f32>(running.window.scale_factor());
                running
                    .showcase
                    .pointer()
                    .move_to(Vec2::new(logical.x, logical.y));
            }
            WindowEvent::MouseInput { state, button, .. } => {
                running.handle_mouse_button(state, button);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                // Positive means away from the target, as a browser reports it.
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y * 100.0,
                    MouseScrollDelta::PixelDelta(position) => -position.y as f32,
                };
                running.showcase.pointer().wheel(delta_y);
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = running.scheduler.run_tick(&mut running.showcase) {
                    match err {
                        SchedulerError::NotScheduled(state) => {
                            warn!("redraw while {state}; rescheduling");
                            running.scheduler.request();
                        }
                        SchedulerError::Render(err) => {
                            self.fail(event_loop, anyhow::Error::new(err).context("render failed"));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.as_ref() {
            running.window.request_redraw();
        }
    }
}

impl Running {
    fn resize(&mut self) {
        let scale = self.window.scale_factor();
        let logical = self.window.inner_size().to_logical::<u32>(scale);
        self.showcase
            .handle_resize(logical.width, logical.height, scale as f32);
    }

    fn handle_mouse_button(&mut self, state: ElementState, button: WinitMouseButton) {
        let button = map_mouse_button(button);
        let pointer = Arc::clone(self.showcase.pointer());
        match state {
            ElementState::Pressed => {
                pointer.set_button_down(button);
                let now = self.scheduler.clock().source().now_seconds();
                if button == MouseButton::LEFT && self.clicks.press(now) {
                    let api = WindowFullscreen(&self.window);
                    self.showcase.toggle_fullscreen(&[&api]);
                }
            }
            ElementState::Released => pointer.set_button_up(button),
        }
    }
}

fn map_mouse_button(button: WinitMouseButton) -> MouseButton {
    match button {
        WinitMouseButton::Left => MouseButton::LEFT,
        WinitMouseButton::Middle => MouseButton::MIDDLE,
        WinitMouseButton::Right => MouseButton::RIGHT,
        WinitMouseButton::Back => MouseButton::new(3),
        WinitMouseButton::Forward => MouseButton::new(4),
        WinitMouseButton::Other(value) => MouseButton::new(value.min(u8::MAX as u16) as u8),
    }
}

/// Borderless fullscreen on the window's current monitor.
struct WindowFullscreen<'a>(&'a Window);

impl FullscreenApi for WindowFullscreen<'_> {
    fn name(&self) -> &str {
        "borderless"
    }

    fn is_active(&self) -> bool {
        self.0.fullscreen().is_some()
    }

    fn request(&self) -> bool {
        self.0.set_fullscreen(Some(Fullscreen::Borderless(None)));
        true
    }

    fn exit(&self) -> bool {
        self.0.set_fullscreen(None);
        true
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

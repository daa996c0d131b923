//! Browser host: a canvas, `requestAnimationFrame` and `fetch`.

use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

use anyhow::{anyhow, Result};
use gloo_events::EventListener;
use js_sys::{Function, Reflect, Uint8Array};
use log::{error, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{window, Document, Element, HtmlCanvasElement, Response};

use crate::app::{ProductAssets, Showcase};
use crate::asset::{AssetLoadError, AssetLoader, AssetSource};
use crate::config::ShowcaseConfig;
use crate::frame::{FrameScheduler, PerformanceClock, SchedulerError};
use crate::input::wasm::WasmPointerHandler;
use crate::render::GpuBackend;
use crate::viewport::{FullscreenApi, FullscreenChange, Viewport};

#[wasm_bindgen(start)]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::new(log::Level::Info));
}

/// Reads assets over HTTP relative to a base URL.
#[derive(Debug, Clone)]
pub struct FetchSource {
    base: String,
}

impl FetchSource {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    fn url(&self, path: &str) -> String {
        if self.base.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.base.trim_end_matches('/'), path)
        }
    }
}

impl AssetSource for FetchSource {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, AssetLoadError>> {
        let url = self.url(path);
        let path = path.to_string();
        async move {
            fetch_bytes(&url).await.map_err(|err| AssetLoadError::Fetch {
                path,
                reason: err.as_string().unwrap_or_else(|| format!("{err:?}")),
            })
        }
    }
}

async fn fetch_bytes(url: &str) -> Result<Vec<u8>, JsValue> {
    let window = window().ok_or_else(|| JsValue::from_str("window not available"))?;
    let response: Response = JsFuture::from(window.fetch_with_str(url))
        .await?
        .dyn_into()?;
    if !response.ok() {
        return Err(JsValue::from_str(&format!(
            "HTTP {} {}",
            response.status(),
            response.status_text()
        )));
    }
    let buffer = JsFuture::from(response.array_buffer()?).await?;
    Ok(Uint8Array::new(&buffer).to_vec())
}

/// Fullscreen through one set of DOM property and method names, looked up
/// at call time so missing vendor variants simply report unavailable.
struct DomFullscreen {
    name: &'static str,
    element_property: &'static str,
    request_method: &'static str,
    exit_method: &'static str,
    document: Document,
    target: Element,
}

impl DomFullscreen {
    fn standard(document: &Document, target: &Element) -> Self {
        Self {
            name: "fullscreen",
            element_property: "fullscreenElement",
            request_method: "requestFullscreen",
            exit_method: "exitFullscreen",
            document: document.clone(),
            target: target.clone(),
        }
    }

    fn webkit(document: &Document, target: &Element) -> Self {
        Self {
            name: "webkit-fullscreen",
            element_property: "webkitFullscreenElement",
            request_method: "webkitRequestFullscreen",
            exit_method: "webkitExitFullscreen",
            document: document.clone(),
            target: target.clone(),
        }
    }
}

impl FullscreenApi for DomFullscreen {
    fn name(&self) -> &str {
        self.name
    }

    fn is_active(&self) -> bool {
        Reflect::get(&self.document, &JsValue::from_str(self.element_property))
            .map(|element| !element.is_null() && !element.is_undefined())
            .unwrap_or(false)
    }

    fn request(&self) -> bool {
        call_method(&self.target, self.request_method)
    }

    fn exit(&self) -> bool {
        call_method(&self.document, self.exit_method)
    }
}

fn call_method(target: &JsValue, name: &str) -> bool {
    let Ok(method) = Reflect::get(target, &JsValue::from_str(name)) else {
        return false;
    };
    match method.dyn_ref::<Function>() {
        Some(function) => function.call0(target).is_ok(),
        None => false,
    }
}

#[wasm_bindgen]
pub struct ShowcaseApp {
    inner: Rc<RefCell<AppState>>,
    _listeners: Vec<EventListener>,
}

#[wasm_bindgen]
impl ShowcaseApp {
    /// Binds the showcase to the canvas with id `canvas_id` and starts
    /// fetching the product from `asset_root`. `config_xml` overrides the
    /// default startup settings.
    #[wasm_bindgen(constructor)]
    pub async fn new(
        canvas_id: String,
        asset_root: String,
        config_xml: Option<String>,
    ) -> Result<ShowcaseApp, JsValue> {
        let config = match config_xml {
            Some(xml) => ShowcaseConfig::from_xml(&xml).map_err(to_js)?,
            None => ShowcaseConfig::default(),
        };

        let window = window().ok_or_else(|| JsValue::from_str("window not available"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("document not available"))?;
        let canvas = document
            .get_element_by_id(&canvas_id)
            .ok_or_else(|| JsValue::from_str("canvas element not found"))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| JsValue::from_str("element is not a canvas"))?;

        let viewport = Viewport::new(
            css_size(canvas.client_width()),
            css_size(canvas.client_height()),
            window.device_pixel_ratio() as f32,
        );
        let (width, height) = viewport.physical_size();
        canvas.set_width(width);
        canvas.set_height(height);

        let backend = GpuBackend::new(wgpu::SurfaceTarget::Canvas(canvas.clone()), width, height)
            .await
            .map_err(|err| to_js(format!("{err:#}")))?;
        let mut showcase = Showcase::new(backend, viewport, &config);
        showcase.apply_config(&config).map_err(to_js)?;

        let clock =
            PerformanceClock::new().ok_or_else(|| JsValue::from_str("performance not available"))?;
        let pointer = WasmPointerHandler::attach(&canvas, showcase.pointer().clone())
            .map_err(|err| to_js(format!("{err:#}")))?;
        let fullscreen = vec![
            DomFullscreen::standard(&document, &canvas),
            DomFullscreen::webkit(&document, &canvas),
        ];

        let inner = Rc::new(RefCell::new(AppState {
            showcase,
            scheduler: FrameScheduler::new(clock),
            canvas: canvas.clone(),
            fullscreen,
            _pointer: pointer,
            animation_closure: None,
            frame_handle: None,
        }));

        let listeners = vec![
            {
                let app = Rc::downgrade(&inner);
                EventListener::new(&window, "resize", move |_| {
                    with_state(&app, AppState::resize_to_canvas);
                })
            },
            {
                let app = Rc::downgrade(&inner);
                EventListener::new(&canvas, "dblclick", move |_| {
                    with_state(&app, |state| {
                        state.toggle_fullscreen();
                    });
                })
            },
        ];

        spawn_product_load(Rc::downgrade(&inner), FetchSource::new(asset_root), config);

        Ok(Self {
            inner,
            _listeners: listeners,
        })
    }

    /// Starts the animation loop.
    pub fn start(&self) -> Result<(), JsValue> {
        if !self.inner.borrow_mut().scheduler.request() {
            return Ok(());
        }
        schedule_animation_loop(Rc::clone(&self.inner)).map_err(|err| to_js(format!("{err:#}")))
    }

    /// Stops the animation loop after the current frame.
    pub fn stop(&self) {
        let mut state = self.inner.borrow_mut();
        state.scheduler.stop();
        if let Some(handle) = state.frame_handle.take() {
            if let Some(window) = window() {
                if let Err(err) = window.cancel_animation_frame(handle) {
                    warn!("cancelAnimationFrame failed: {err:?}");
                }
            }
        }
    }

    /// Applies a panel edit such as `("bloomStrength", "1.2")` and returns
    /// the value that was actually set.
    #[wasm_bindgen(js_name = setParameter)]
    pub fn set_parameter(&self, key: &str, value: &str) -> Result<String, JsValue> {
        let applied = self
            .inner
            .borrow_mut()
            .showcase
            .edit_parameter_text(key, value)
            .map_err(to_js)?;
        Ok(applied.to_string())
    }

    /// Folder and control layout for a host-side settings panel.
    #[wasm_bindgen(js_name = panelSchema)]
    pub fn panel_schema_json(&self) -> Result<String, JsValue> {
        self.inner
            .borrow()
            .showcase
            .panel()
            .schema()
            .to_json()
            .map_err(to_js)
    }

    #[wasm_bindgen(js_name = toggleFullscreen)]
    pub fn toggle_fullscreen(&self) -> String {
        format!("{:?}", self.inner.borrow_mut().toggle_fullscreen())
    }
}

struct AppState {
    showcase: Showcase<GpuBackend>,
    scheduler: FrameScheduler<PerformanceClock>,
    canvas: HtmlCanvasElement,
    fullscreen: Vec<DomFullscreen>,
    _pointer: WasmPointerHandler,
    animation_closure: Option<Closure<dyn FnMut()>>,
    frame_handle: Option<i32>,
}

impl AppState {
    /// Runs one tick. Returns whether the loop should continue.
    fn render_frame(&mut self) -> bool {
        match self.scheduler.run_tick(&mut self.showcase) {
            Ok(_) => true,
            Err(SchedulerError::NotScheduled(state)) => {
                info!("animation loop ended while {state}");
                false
            }
            Err(SchedulerError::Render(err)) => {
                error!("render failed: {err}");
                false
            }
        }
    }

    fn resize_to_canvas(&mut self) {
        let host_ratio = window().map_or(1.0, |window| window.device_pixel_ratio() as f32);
        self.showcase.handle_resize(
            css_size(self.canvas.client_width()),
            css_size(self.canvas.client_height()),
            host_ratio,
        );
        let (width, height) = self.showcase.viewport().physical_size();
        self.canvas.set_width(width);
        self.canvas.set_height(height);
    }

    fn toggle_fullscreen(&mut self) -> FullscreenChange {
        let apis: Vec<&dyn FullscreenApi> = self
            .fullscreen
            .iter()
            .map(|api| api as &dyn FullscreenApi)
            .collect();
        self.showcase.toggle_fullscreen(&apis)
    }
}

fn with_state(app: &Weak<RefCell<AppState>>, f: impl FnOnce(&mut AppState)) {
    let Some(app) = app.upgrade() else {
        return;
    };
    match app.try_borrow_mut() {
        Ok(mut state) => f(&mut state),
        Err(_) => warn!("showcase busy; dropping event"),
    };
}

fn spawn_product_load(app: Weak<RefCell<AppState>>, source: FetchSource, config: ShowcaseConfig) {
    spawn_local(async move {
        let loader = AssetLoader::new(source);
        let result = ProductAssets::fetch(&loader, &config).await;
        with_state(&app, |state| {
            let attached = result
                .map_err(|err| err.to_string())
                .and_then(|assets| {
                    state
                        .showcase
                        .install_product(assets)
                        .map(|product| {
                            let roles: Vec<_> =
                                product.parts.iter().map(|part| part.role.as_str()).collect();
                            roles.join(", ")
                        })
                        .map_err(|err| err.to_string())
                });
            match attached {
                Ok(parts) => info!("Loaded {} with parts: {parts}", config.asset),
                Err(err) => error!("No product attached: {err}"),
            }
        });
    });
}

fn schedule_animation_loop(app: Rc<RefCell<AppState>>) -> Result<()> {
    let app_clone = Rc::clone(&app);
    let closure = Closure::wrap(Box::new(move || {
        let keep_going = {
            let mut state = app_clone.borrow_mut();
            state.frame_handle = None;
            state.render_frame()
        };
        if keep_going {
            if let Err(err) = request_frame(&app_clone) {
                error!("{err:#}");
            }
        }
    }) as Box<dyn FnMut()>);

    app.borrow_mut().animation_closure = Some(closure);
    request_frame(&app)
}

fn request_frame(app: &Rc<RefCell<AppState>>) -> Result<()> {
    let window = window().ok_or_else(|| anyhow!("window not available"))?;
    let mut state = app.borrow_mut();
    let closure = state
        .animation_closure
        .as_ref()
        .ok_or_else(|| anyhow!("animation loop not installed"))?;
    let handle = window
        .request_animation_frame(closure.as_ref().unchecked_ref())
        .map_err(|err| anyhow!("requestAnimationFrame failed: {err:?}"))?;
    state.frame_handle = Some(handle);
    Ok(())
}

fn css_size(pixels: i32) -> u32 {
    pixels.max(1) as u32
}

fn to_js(err: impl ToString) -> JsValue {
    JsValue::from_str(&err.to_string())
}

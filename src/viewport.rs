use log::{debug, info};

/// Upper bound on the device pixel ratio used for the render target.
pub const MAX_PIXEL_RATIO: f32 = 2.0;

/// One way of toggling fullscreen on the host, such as the standard
/// Fullscreen API or a vendor-prefixed variant.
pub trait FullscreenApi {
    fn name(&self) -> &str;
    /// Whether something is currently fullscreen through this API.
    fn is_active(&self) -> bool;
    /// Requests fullscreen. Returns `false` when the API is unavailable.
    fn request(&self) -> bool;
    /// Leaves fullscreen. Returns `false` when the API is unavailable.
    fn exit(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenChange {
    Entered,
    Exited,
    /// No API could perform the change; nothing happened.
    Unavailable,
}

/// Logical size, pixel density and fullscreen flag of the output surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    width: u32,
    height: u32,
    host_pixel_ratio: f32,
    fullscreen: bool,
}

impl Viewport {
    pub fn new(width: u32, height: u32, host_pixel_ratio: f32) -> Self {
        let mut viewport = Self {
            width: 1,
            height: 1,
            host_pixel_ratio: 1.0,
            fullscreen: false,
        };
        viewport.resize(width, height, host_pixel_ratio);
        viewport
    }

    /// Applies a host resize. Sizes are logical (CSS) pixels.
    pub fn resize(&mut self, width: u32, height: u32, host_pixel_ratio: f32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.host_pixel_ratio = if host_pixel_ratio.is_finite() && host_pixel_ratio > 0.0 {
            host_pixel_ratio
        } else {
            1.0
        };
        debug!(
            "viewport {}x{} at ratio {}",
            self.width,
            self.height,
            self.pixel_ratio()
        );
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn host_pixel_ratio(&self) -> f32 {
        self.host_pixel_ratio
    }

    /// Pixel ratio actually rendered at: the host's, capped at
    /// [`MAX_PIXEL_RATIO`].
    pub fn pixel_ratio(&self) -> f32 {
        self.host_pixel_ratio.min(MAX_PIXEL_RATIO)
    }

    /// Size of the render target in physical pixels.
    pub fn physical_size(&self) -> (u32, u32) {
        let ratio = self.pixel_ratio();
        let scale = |logical: u32| ((logical as f32 * ratio).round() as u32).max(1);
        (scale(self.width), scale(self.height))
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Enters fullscreen when nothing is fullscreen and leaves it otherwise,
    /// trying each API in order until one is available.
    pub fn toggle_fullscreen(&mut self, apis: &[&dyn FullscreenApi]) -> FullscreenChange {
        let active = apis.iter().any(|api| api.is_active());
        for api in apis {
            let done = if active { api.exit() } else { api.request() };
            if done {
                self.fullscreen = !active;
                info!(
                    "{} fullscreen via {}",
                    if active { "left" } else { "entered" },
                    api.name()
                );
                return if active {
                    FullscreenChange::Exited
                } else {
                    FullscreenChange::Entered
                };
            }
        }
        debug!("no fullscreen API available");
        FullscreenChange::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct FakeApi {
        name: &'static str,
        available: bool,
        active: Cell<bool>,
        calls: Cell<u32>,
    }

    impl FakeApi {
        fn new(name: &'static str, available: bool) -> Self {
            Self {
                name,
                available,
                active: Cell::new(false),
                calls: Cell::new(0),
            }
        }
    }

    impl FullscreenApi for FakeApi {
        fn name(&self) -> &str {
            self.name
        }

        fn is_active(&self) -> bool {
            self.active.get()
        }

        fn request(&self) -> bool {
            if self.available {
                self.calls.set(self.calls.get() + 1);
                self.active.set(true);
            }
            self.available
        }

        fn exit(&self) -> bool {
            if self.available {
                self.calls.set(self.calls.get() + 1);
                self.active.set(false);
            }
            self.available
        }
    }

    #[test]
    fn pixel_ratio_is_capped_at_two() {
        let mut viewport = Viewport::new(800, 600, 3.0);
        assert_eq!(viewport.pixel_ratio(), 2.0);
        assert_eq!(viewport.physical_size(), (1600, 1200));
        viewport.resize(1024, 768, 1.5);
        assert_eq!(viewport.pixel_ratio(), 1.5);
        assert_eq!(viewport.physical_size(), (1536, 1152));
        assert!((viewport.aspect() - 4.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_sizes_are_clamped() {
        let viewport = Viewport::new(0, 0, f32::NAN);
        assert_eq!(viewport.physical_size(), (1, 1));
        assert_eq!(viewport.pixel_ratio(), 1.0);
    }

    #[test]
    fn toggling_twice_restores_the_state() {
        let standard = FakeApi::new("standard", true);
        let prefixed = FakeApi::new("webkit", true);
        let mut viewport = Viewport::new(800, 600, 1.0);

        assert_eq!(
            viewport.toggle_fullscreen(&[&standard, &prefixed]),
            FullscreenChange::Entered
        );
        assert!(viewport.is_fullscreen());
        assert_eq!(
            viewport.toggle_fullscreen(&[&standard, &prefixed]),
            FullscreenChange::Exited
        );
        assert!(!viewport.is_fullscreen());
        assert!(!standard.is_active());
        assert_eq!(prefixed.calls.get(), 0);
    }

    #[test]
    fn falls_back_to_the_prefixed_api() {
        let standard = FakeApi::new("standard", false);
        let prefixed = FakeApi::new("webkit", true);
        let mut viewport = Viewport::new(800, 600, 1.0);
        assert_eq!(
            viewport.toggle_fullscreen(&[&standard, &prefixed]),
            FullscreenChange::Entered
        );
        assert!(prefixed.is_active());
    }

    #[test]
    fn no_api_is_a_no_op() {
        let standard = FakeApi::new("standard", false);
        let mut viewport = Viewport::new(800, 600, 1.0);
        assert_eq!(
            viewport.toggle_fullscreen(&[&standard]),
            FullscreenChange::Unavailable
        );
        assert!(!viewport.is_fullscreen());
        assert_eq!(viewport.toggle_fullscreen(&[]), FullscreenChange::Unavailable);
    }
}

//! Present Loop
//!
//! Opens a window, drives the device context's frame state machine and clears
//! each back buffer through its cached render-target view.
//!
//! Keys:
//! - `Space` toggles between vsync and unthrottled presentation
//! - `Escape` quits
//!
//! Run with `RUST_LOG=info cargo run --example present_loop`.

use std::sync::Arc;
use std::time::Instant;

use loupe::loupe_core::LoupeError;
use loupe::loupe_render::{
    DeviceResources, DeviceSettings, FrameState, FrameStatus, PresentPolicy, WgpuBackend,
};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

struct PresentLoop {
    window: Option<Arc<Window>>,
    device: DeviceResources<WgpuBackend>,
    policy: PresentPolicy,
    start: Instant,
    skipped: u64,
}

impl PresentLoop {
    fn new() -> Self {
        Self {
            window: None,
            device: DeviceResources::new(DeviceSettings::default()),
            policy: PresentPolicy::VSync,
            start: Instant::now(),
            skipped: 0,
        }
    }

    fn init_device(&mut self, window: &Arc<Window>) -> loupe::Result<()> {
        let size = window.inner_size();
        self.device
            .initialize_with_window(window.clone(), size.width.max(1), size.height.max(1))
    }

    fn render(&mut self) -> loupe::Result<()> {
        let back_buffer = match self.device.begin_frame()? {
            FrameStatus::Ready(id) => id,
            FrameStatus::Skipped => {
                self.skipped += 1;
                return Ok(());
            }
        };
        let rtv = self.device.get_render_target_view(back_buffer)?;

        let (Some(device), Some(queue)) = (self.device.device(), self.device.queue()) else {
            return Err(LoupeError::NotInitialized);
        };
        let t = f64::from(self.start.elapsed().as_secs_f32());
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Present Loop Clear"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Back Buffer"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &*rtv,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.5 + 0.5 * t.sin(),
                            g: 0.5 + 0.5 * (t * 0.7).sin(),
                            b: 0.5 + 0.5 * (t * 1.3).sin(),
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
        }
        queue.submit(Some(encoder.finish()));

        self.device.end_frame(self.policy)?;

        let frame = self.device.frame_index();
        if frame % 600 == 0 {
            log::info!(
                "{frame} frames presented, {} skipped, {:?}",
                self.skipped,
                self.policy
            );
        }
        Ok(())
    }

    /// Recovers from device loss with a fresh device for the same window.
    fn handle_error(&mut self, err: &LoupeError, event_loop: &ActiveEventLoop) {
        match err {
            LoupeError::DeviceLost(_) => {
                let Some(window) = self.window.clone() else {
                    return;
                };
                log::warn!("Recreating device after loss");
                if let Err(e) = self.init_device(&window) {
                    log::error!("Device recovery failed: {e}");
                    event_loop.exit();
                }
            }
            other => log::error!("Frame failed: {other}"),
        }
    }
}

impl ApplicationHandler for PresentLoop {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("Loupe Present Loop")
            .with_inner_size(winit::dpi::LogicalSize::new(1280.0, 720.0));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        log::info!("Initializing device context...");
        if let Err(e) = self.init_device(&window) {
            log::error!("Fatal device error: {e}");
            event_loop.exit();
            return;
        }
        self.window = Some(window);
        self.start = Instant::now();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if self.device.state() == FrameState::Ready
                    && let Err(e) = self.device.resize(size.width, size.height)
                {
                    self.handle_error(&e, event_loop);
                }
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && !event.repeat =>
            {
                match event.logical_key {
                    Key::Named(NamedKey::Space) => {
                        self.policy = match self.policy {
                            PresentPolicy::VSync => PresentPolicy::Unthrottled,
                            PresentPolicy::Unthrottled => PresentPolicy::VSync,
                        };
                        log::info!(
                            "Present policy {:?} (tearing supported: {})",
                            self.policy,
                            self.device.supports_tearing()
                        );
                    }
                    Key::Named(NamedKey::Escape) => event_loop.exit(),
                    _ => {}
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    self.handle_error(&e, event_loop);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run_app(&mut PresentLoop::new())?;
    Ok(())
}

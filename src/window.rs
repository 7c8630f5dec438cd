//! The viewer window and its event loop.
//!
//! Keyboard and mouse events are folded into a [`CameraInput`] that the frame
//! callback reads once per frame.

use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;
use winit::dpi::PhysicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{DeviceEvent, ElementState, Event, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::scene::CameraInput;

/// Pixels of smooth scrolling that count as one wheel notch.
const PIXELS_PER_LINE: f32 = 40.0;

pub struct Window {
    handle: Arc<winit::window::Window>,
    pending_resize: Option<(u32, u32)>,
    closing: bool,
    input: CameraInput,
}

impl Window {
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> Result<Self, OsError> {
        let handle = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(event_loop)?;
        Ok(Self {
            handle: Arc::new(handle),
            pending_resize: None,
            closing: false,
            input: CameraInput::new(),
        })
    }

    /// Shared winit window, for creating the surface.
    pub fn handle(&self) -> Arc<winit::window::Window> {
        self.handle.clone()
    }

    /// The latest size the window was resized to, if it changed since the last call.
    pub fn take_resize(&mut self) -> Option<(u32, u32)> {
        self.pending_resize.take()
    }

    /// Leave the event loop once the current frame is done.
    pub fn close(&mut self) {
        self.closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn input(&self) -> &CameraInput {
        &self.input
    }

    fn on_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => self.pending_resize = Some((size.width, size.height)),
            WindowEvent::CloseRequested => self.closing = true,
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => self.on_key(*code, *state == ElementState::Pressed),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => self.input.mouse_look_active = *state == ElementState::Pressed,
            WindowEvent::MouseWheel { delta, .. } => {
                self.input.scroll_delta += match *delta {
                    MouseScrollDelta::LineDelta(_, lines) => lines,
                    MouseScrollDelta::PixelDelta(offset) => offset.y as f32 / PIXELS_PER_LINE,
                }
            }
            _ => {}
        }
    }

    fn on_key(&mut self, code: KeyCode, pressed: bool) {
        let held = match code {
            KeyCode::KeyW => &mut self.input.forward,
            KeyCode::KeyS => &mut self.input.backward,
            KeyCode::KeyA => &mut self.input.left,
            KeyCode::KeyD => &mut self.input.right,
            KeyCode::KeyE => &mut self.input.up,
            KeyCode::KeyQ => &mut self.input.down,
            KeyCode::Escape => {
                self.closing |= pressed;
                return;
            }
            _ => return,
        };
        *held = pressed;
    }
}

/// Drive `frame` once per loop iteration with the seconds elapsed since the
/// previous call, until the window closes.
pub fn run<F>(event_loop: EventLoop<()>, mut window: Window, mut frame: F) -> Result<(), EventLoopError>
where
    F: FnMut(&mut Window, f32) + 'static,
{
    let mut last = Instant::now();
    event_loop.run(move |event, target| {
        target.set_control_flow(ControlFlow::Poll);
        match event {
            Event::WindowEvent { event, .. } => window.on_window_event(&event),
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta: (dx, dy) },
                ..
            } => {
                // Screen y points down, pitch points up.
                window.input.mouse_delta += Vec2::new(dx as f32, -dy as f32);
            }
            Event::AboutToWait if !window.closing => {
                let now = Instant::now();
                frame(&mut window, now.duration_since(last).as_secs_f32());
                last = now;
                window.input.reset_deltas();
                window.handle.request_redraw();
            }
            _ => {}
        }
        if window.closing {
            target.exit();
        }
    })
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, Ime, MouseButton as WinitButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{Fullscreen, Window, WindowId};

use chimera::cli::Cli;
use chimera::client::Client;
use chimera::config::Config;
use chimera::data::DataManager;
use chimera::gpu::Gpu;
use chimera::gpu::text::{SharedText, TextRasterizer};
use chimera::paths::Paths;
use chimera::states::{StateArgs, StateKind, StateMachine, Transition};
use chimera::ui::keys::{self, KeyEvent, Modifiers};
use chimera::ui::{ImageSource, MouseButton, Ui};

struct App {
    client: Arc<Client>,
    machine: StateMachine,
    ui: Ui,
    text: SharedText,
    gpu: Option<Gpu>,
    modifiers: Modifiers,
    /// The last key press was consumed; drop the text it produces.
    suppress_text: bool,
    frame_interval: Duration,
    next_frame: Instant,
    started: bool,
    failed: bool,
}

impl App {
    fn new(client: Arc<Client>) -> Self {
        let text = SharedText::new(TextRasterizer::new(
            client.paths.share("fonts").as_deref(),
        ));
        let (w, h) = {
            let config = client.config();
            (config.window.width, config.window.height)
        };
        let mut ui = Ui::new(w as f64, h as f64, Box::new(text.clone()));
        let images: Arc<dyn ImageSource> = client.data.clone();
        ui.set_image_source(images);
        let frame_interval = Duration::from_secs_f64(1.0 / client.fps as f64);
        Self {
            machine: StateMachine::new(client.clone()),
            client,
            ui,
            text,
            gpu: None,
            modifiers: Modifiers::empty(),
            suppress_text: false,
            frame_interval,
            next_frame: Instant::now(),
            started: false,
            failed: false,
        }
    }

    fn data(&self) -> &DataManager {
        &self.client.data
    }

    fn key(&mut self, code: u32, pressed: bool, repeat: bool) {
        let key = KeyEvent {
            code,
            modifiers: self.modifiers,
            pressed,
            repeat,
        };
        let bound = if self.ui.handle_key(key) {
            self.machine.key_consumed(&mut self.ui, key);
            false
        } else {
            self.machine.key(&mut self.ui, key)
        };
        if pressed {
            self.suppress_text = bound;
        }
    }

    fn tick(&mut self, event_loop: &ActiveEventLoop, now: Instant) {
        self.machine.tick(&mut self.ui, now);
        if self.machine.is_quit() {
            event_loop.exit();
            return;
        }
        let loaded = self.data().take_loaded();
        if !loaded.is_empty() {
            self.ui.tree.images_loaded(&loaded);
        }
        if self.ui.frame(now)
            && let Some(gpu) = &self.gpu
        {
            gpu.window().request_redraw();
        }
    }
}

fn button(b: WinitButton) -> Option<MouseButton> {
    match b {
        WinitButton::Left => Some(MouseButton::Left),
        WinitButton::Middle => Some(MouseButton::Middle),
        WinitButton::Right => Some(MouseButton::Right),
        _ => None,
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }

        let (w, h, fullscreen) = {
            let config = self.client.config();
            (
                config.window.width,
                config.window.height,
                config.window.fullscreen,
            )
        };
        let mut attrs = Window::default_attributes()
            .with_title("Chimera")
            .with_inner_size(winit::dpi::PhysicalSize::new(w.max(1), h.max(1)));
        if fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("failed to create window: {e}");
                self.failed = true;
                event_loop.exit();
                return;
            }
        };
        let size = window.inner_size();

        match Gpu::new(window, self.text.clone()) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => {
                log::error!("{e}");
                self.failed = true;
                event_loop.exit();
                return;
            }
        }
        self.ui
            .handle_resize(size.width as f64, size.height as f64);

        if !self.started {
            self.started = true;
            self.machine.apply(
                &mut self.ui,
                Transition::Push(StateKind::List, StateArgs::None),
            );
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.machine.apply(&mut self.ui, Transition::Quit);
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(size.width, size.height);
                }
                self.ui
                    .handle_resize(size.width as f64, size.height as f64);
                let mut config = self.client.config();
                config.window.width = size.width;
                config.window.height = size.height;
            }
            WindowEvent::Moved(pos) => {
                let mut config = self.client.config();
                config.window.x = pos.x;
                config.window.y = pos.y;
            }
            WindowEvent::ModifiersChanged(m) => {
                self.modifiers = Modifiers::from_winit(m.state());
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.ui.handle_mouse_move(position.x, position.y);
            }
            WindowEvent::MouseInput { state, button: b, .. } => {
                if let Some(b) = button(b) {
                    let (x, y) = self.ui.cursor;
                    self.ui.handle_mouse_button(
                        b,
                        state == ElementState::Pressed,
                        x,
                        y,
                        Instant::now(),
                    );
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let pressed = event.state == ElementState::Pressed;
                if let PhysicalKey::Code(code) = event.physical_key
                    && let Some(code) = keys::from_winit(code)
                {
                    self.key(code, pressed, event.repeat);
                }
                let suppress = std::mem::take(&mut self.suppress_text);
                if pressed
                    && !suppress
                    && let Some(text) = event.text.as_deref()
                    && !text.chars().all(char::is_control)
                {
                    self.ui.handle_text_input(text);
                }
            }
            WindowEvent::Ime(Ime::Preedit(text, cursor)) => {
                let (start, end) = cursor.unwrap_or((0, 0));
                self.ui
                    .handle_text_edit(&text, start as i32, (end - start) as i32);
            }
            WindowEvent::Ime(Ime::Commit(text)) => {
                self.ui.handle_text_input(&text);
            }
            WindowEvent::RedrawRequested => {
                if let Some(gpu) = &mut self.gpu {
                    let list = self.ui.render();
                    gpu.render(list, &self.client.data);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_frame {
            self.tick(event_loop, now);
            self.next_frame = now + self.frame_interval;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.client.disconnect();
        self.client.save_config();
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let paths = Paths::discover();
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let mut config = Config::load(&config_path);
    if cli.fullscreen {
        config.window.fullscreen = true;
    }
    log::info!("config: {}", config_path.display());

    let client = Arc::new(Client::new(&cli, paths, config));
    let mut app = App::new(client);

    let event_loop = match EventLoop::new() {
        Ok(e) => e,
        Err(e) => {
            log::error!("failed to create event loop: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("event loop: {e}");
        std::process::exit(1);
    }
    if app.failed {
        std::process::exit(1);
    }
}

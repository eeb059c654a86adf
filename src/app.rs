use crate::beep::{self, Chime};
use crate::cli::{Cli, Commands, FetchArgs, RunArgs};
use crate::clipboard;
use crate::config::{Config, ConfigStore};
use crate::controller::Controller;
use crate::engine::YtDlpEngine;
use crate::job::Outcome;
use crate::logging;
use crate::preflight::{binary_on_path, Environment, SystemEnvironment};
use crate::storage;
use crate::tray::{TrayAction, TrayController};
use anyhow::{Context, Result};
use clap::Parser;
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager};
use indicatif::{ProgressBar, ProgressStyle};
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageLevel};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tao::event::{Event, StartCause};
use tao::event_loop::{ControlFlow, EventLoop};
use tray_icon::menu::MenuEvent;

const HOTKEY_LABEL: &str = "Ctrl+Shift+Y";

pub fn run() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run_tray(args),
        Commands::Fetch(args) => run_fetch(args),
        Commands::Check => run_check(),
    }
}

fn build_controller(config: Config) -> Controller {
    let engine = Arc::new(YtDlpEngine::from_command_line(&config.engine_binary));
    let environment = Box::new(SystemEnvironment::from_config(&config));
    Controller::new(config, engine, environment)
}

fn run_check() -> Result<()> {
    let config = ConfigStore::new()?.load()?;
    let engine = YtDlpEngine::from_command_line(&config.engine_binary);
    let environment = SystemEnvironment::from_config(&config);
    let report = [
        (config.transcoder.as_str(), environment.transcoder_available(&config.transcoder)),
        (engine.program(), binary_on_path(engine.program())),
        ("network", environment.is_online()),
    ];
    for (name, ok) in report {
        println!("{:<10} {}", name, if ok { "ok" } else { "missing" });
    }
    if report.iter().all(|(_, ok)| *ok) {
        Ok(())
    } else {
        anyhow::bail!("environment not ready")
    }
}

fn run_fetch(args: FetchArgs) -> Result<()> {
    let mut config = ConfigStore::new()?.load()?;
    if let Some(out) = args.out {
        config.default_output_dir = out;
    }
    let target = config.default_output_dir.clone();
    let format = config.audio_format.clone();
    let min_size = config.min_valid_output_size_bytes;
    tracing::info!(url = %args.url, dir = %target.display(), "fetch");

    let mut controller = build_controller(config);
    controller
        .request_start(&args.url, &target)
        .map_err(anyhow::Error::new)?;

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    loop {
        let outcome = controller.poll(Instant::now());
        let view = controller.view();
        pb.set_position(u64::from(view.percent));
        pb.set_message(view.status.clone());
        match outcome {
            Some(Outcome::Completed) => {
                pb.finish_with_message("Done");
                for path in storage::finished_outputs(&target, &format, min_size)? {
                    println!("{}", path.display());
                }
                return Ok(());
            }
            Some(outcome) if outcome.is_user_cancellation() => {
                pb.abandon_with_message("Cancelled");
                anyhow::bail!("download cancelled");
            }
            Some(Outcome::Failed(detail)) => {
                pb.abandon_with_message("Error");
                anyhow::bail!(detail);
            }
            Some(Outcome::Cancelled) | None => {}
        }
        thread::sleep(Duration::from_millis(100));
    }
}

fn run_tray(args: RunArgs) -> Result<()> {
    tracing::info!("starting tray app");
    let store = ConfigStore::new()?;
    let mut config = store.load()?;
    if let Some(out) = args.out {
        config.default_output_dir = out;
        store.save(&config)?;
    }
    storage::ensure_dir_best_effort(&config.default_output_dir);

    let controller = build_controller(config);
    let tray = TrayController::new(controller.view(), HOTKEY_LABEL)?;
    let app = App {
        store,
        controller,
        tray,
        started: Instant::now(),
    };
    app.event_loop()
}

struct App {
    store: ConfigStore,
    controller: Controller,
    tray: TrayController,
    started: Instant,
}

impl App {
    fn event_loop(mut self) -> Result<()> {
        let event_loop = EventLoop::<()>::new();
        let hotkey_manager = GlobalHotKeyManager::new().context("init hotkey manager")?;
        let hotkey = HotKey::new(Some(Modifiers::CONTROL | Modifiers::SHIFT), Code::KeyY);
        hotkey_manager
            .register(hotkey)
            .with_context(|| format!("register {HOTKEY_LABEL}"))?;
        let hotkey_rx = GlobalHotKeyEvent::receiver();
        let menu_rx = MenuEvent::receiver();

        event_loop.run(move |event, _, control_flow| {
            *control_flow = ControlFlow::WaitUntil(Instant::now() + Duration::from_millis(50));
            match event {
                Event::NewEvents(StartCause::Init) => {
                    tracing::info!("event loop started");
                }
                Event::MainEventsCleared => {
                    while let Ok(ev) = hotkey_rx.try_recv() {
                        if ev.id == hotkey.id() {
                            self.handle_hotkey();
                        }
                    }
                    while let Ok(menu_event) = menu_rx.try_recv() {
                        if let Some(action) = self.tray.action_for_menu(menu_event.id) {
                            if let Err(err) = self.handle_menu(action) {
                                tracing::error!(error = %err, "menu handler failed");
                            }
                        }
                    }
                    if let Err(err) = self.tick() {
                        tracing::error!(error = %err, "tray refresh failed");
                    }
                }
                _ => {}
            }
        });
    }

    fn tick(&mut self) -> Result<()> {
        match self.controller.poll(Instant::now()) {
            Some(Outcome::Completed) => play_chime(Chime::Completed),
            Some(outcome) if !outcome.is_user_cancellation() => play_chime(Chime::Failed),
            _ => {}
        }
        if let Some(dialog) = self.controller.view().dialog.clone() {
            let _ = MessageDialog::new()
                .set_level(MessageLevel::Error)
                .set_title(dialog.title.as_str())
                .set_description(dialog.message.as_str())
                .set_buttons(MessageButtons::Ok)
                .show();
            self.controller.dismiss_dialog();
        }
        let offset = self.tray.sweep().offset_at(self.started.elapsed());
        self.tray.render(self.controller.view(), offset)
    }

    fn handle_hotkey(&mut self) {
        if self.controller.is_running() {
            tracing::info!("hotkey ignored while busy");
            return;
        }
        self.start_from_clipboard();
    }

    fn handle_menu(&mut self, action: TrayAction) -> Result<()> {
        match action {
            TrayAction::Download => self.start_from_clipboard(),
            TrayAction::Cancel => {
                self.controller.request_cancel(Instant::now());
            }
            TrayAction::ChangeFolder => self.change_folder()?,
            TrayAction::Quit => {
                if self.controller.is_running() {
                    self.controller.request_cancel(Instant::now());
                }
                tracing::info!("quitting");
                std::process::exit(0);
            }
        }
        Ok(())
    }

    fn start_from_clipboard(&mut self) {
        let link = clipboard::read_link().unwrap_or_else(|err| {
            tracing::warn!(error = %format!("{err:#}"), "clipboard unavailable");
            String::new()
        });
        self.controller.set_input(&link);
        let target = self.controller.view().target_dir.clone();
        if let Err(rejection) = self.controller.request_start(&link, &target) {
            tracing::debug!(reason = %rejection, "start not admitted");
        }
    }

    fn change_folder(&mut self) -> Result<()> {
        let current = self.controller.view().target_dir.clone();
        let Some(dir) = FileDialog::new()
            .set_title("Select download folder")
            .set_directory(&current)
            .pick_folder()
        else {
            return Ok(());
        };
        self.controller.set_target_dir(dir.clone());
        let mut config = self.controller.config().clone();
        config.default_output_dir = dir;
        self.store.save(&config)?;
        Ok(())
    }
}

fn play_chime(chime: Chime) {
    thread::spawn(move || {
        if let Err(err) = beep::play(chime) {
            tracing::debug!(error = %err, "chime unavailable");
        }
    });
}

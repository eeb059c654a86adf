use crate::controller::{ViewState, ERROR_STATUS};
use crate::sweep::{BorderSweep, Rgba, RED};
use anyhow::{Context, Result};
use tray_icon::menu::{Menu, MenuId, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

const ICON_SIZE: usize = 44;
const SWEEP_FRAMES: f32 = 24.0;

#[derive(Debug, Clone)]
pub enum TrayAction {
    Download,
    Cancel,
    ChangeFolder,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IconKey {
    Idle,
    Running { frame: u8, percent: u8 },
    Error,
}

pub struct TrayController {
    tray: TrayIcon,
    status_item: MenuItem,
    folder_item: MenuItem,
    download_item: MenuItem,
    cancel_item: MenuItem,
    change_folder_item: MenuItem,
    quit_id: MenuId,
    sweep: BorderSweep,
    idle_icon: Icon,
    error_icon: Icon,
    shown: Option<IconKey>,
}

impl TrayController {
    pub fn new(view: &ViewState, hotkey_label: &str) -> Result<Self> {
        let status_item = MenuItem::new("Status: Ready", false, None);
        let folder_item = MenuItem::new(folder_label(view), false, None);
        let download_item =
            MenuItem::new(format!("Download Link from Clipboard ({hotkey_label})"), true, None);
        let cancel_item = MenuItem::new("Cancel Download", false, None);
        let change_folder_item = MenuItem::new("Change Folder…", true, None);
        let quit_item = PredefinedMenuItem::quit(None);
        let quit_id = quit_item.id().clone();

        let menu = Menu::new();
        menu.append(&status_item)?;
        menu.append(&folder_item)?;
        menu.append(&PredefinedMenuItem::separator())?;
        menu.append(&download_item)?;
        menu.append(&cancel_item)?;
        menu.append(&change_folder_item)?;
        menu.append(&PredefinedMenuItem::separator())?;
        menu.append(&quit_item)?;

        let idle_icon = icon_idle_note()?;
        let tray = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip("TubeTone")
            .with_icon(idle_icon.clone())
            .build()
            .context("create tray icon")?;

        Ok(Self {
            tray,
            status_item,
            folder_item,
            download_item,
            cancel_item,
            change_folder_item,
            quit_id,
            sweep: BorderSweep::default(),
            idle_icon,
            error_icon: icon_error()?,
            shown: Some(IconKey::Idle),
        })
    }

    pub fn sweep(&self) -> &BorderSweep {
        &self.sweep
    }

    pub fn action_for_menu(&self, id: MenuId) -> Option<TrayAction> {
        if id == *self.download_item.id() {
            Some(TrayAction::Download)
        } else if id == *self.cancel_item.id() {
            Some(TrayAction::Cancel)
        } else if id == *self.change_folder_item.id() {
            Some(TrayAction::ChangeFolder)
        } else if id == self.quit_id {
            Some(TrayAction::Quit)
        } else {
            None
        }
    }

    /// Mirrors the controller view; `sweep_offset` animates the running icon.
    pub fn render(&mut self, view: &ViewState, sweep_offset: f32) -> Result<()> {
        self.status_item.set_text(format!("Status: {}", view.status));
        self.folder_item.set_text(folder_label(view));
        self.download_item.set_enabled(view.start_enabled);
        self.cancel_item.set_enabled(view.cancel_enabled);
        self.change_folder_item.set_enabled(view.start_enabled);

        let key = if view.cancel_enabled {
            IconKey::Running {
                frame: (sweep_offset * SWEEP_FRAMES) as u8,
                percent: view.percent,
            }
        } else if view.status == ERROR_STATUS {
            IconKey::Error
        } else {
            IconKey::Idle
        };
        if self.shown == Some(key) {
            return Ok(());
        }
        let icon = match key {
            IconKey::Idle => self.idle_icon.clone(),
            IconKey::Error => self.error_icon.clone(),
            IconKey::Running { percent, .. } => icon_running(&self.sweep, sweep_offset, percent)?,
        };
        self.tray.set_icon(Some(icon))?;
        self.shown = Some(key);
        Ok(())
    }
}

fn folder_label(view: &ViewState) -> String {
    format!("Folder: {}", view.target_dir.display())
}

fn icon_idle_note() -> Result<Icon> {
    let mut canvas = empty_canvas();
    let black = [0, 0, 0, 255];
    draw_circle(&mut canvas, 16, 31, 7, black);
    draw_rect(&mut canvas, 21, 8, 3, 23, black);
    draw_rect(&mut canvas, 21, 8, 12, 3, black);
    draw_rect(&mut canvas, 30, 8, 3, 9, black);
    Icon::from_rgba(canvas, ICON_SIZE as u32, ICON_SIZE as u32).context("build idle icon")
}

fn icon_running(sweep: &BorderSweep, offset: f32, percent: u8) -> Result<Icon> {
    let mut canvas = empty_canvas();
    let cx = (ICON_SIZE / 2) as i32;
    draw_sweep_ring(&mut canvas, cx, cx, 20, 16, sweep, offset);
    draw_circle(&mut canvas, cx, cx, 13, [60, 60, 60, 255]);
    let angle = (percent.min(100) as f32) / 100.0 * std::f32::consts::TAU;
    draw_wedge(&mut canvas, cx, cx, 13, angle, [255, 255, 255, 255]);
    Icon::from_rgba(canvas, ICON_SIZE as u32, ICON_SIZE as u32).context("build running icon")
}

fn icon_error() -> Result<Icon> {
    let mut canvas = empty_canvas();
    let cx = (ICON_SIZE / 2) as i32;
    draw_circle(&mut canvas, cx, cx, 16, RED);
    draw_rect(&mut canvas, cx - 2, cx - 10, 4, 13, [255, 255, 255, 255]);
    draw_rect(&mut canvas, cx - 2, cx + 6, 4, 4, [255, 255, 255, 255]);
    Icon::from_rgba(canvas, ICON_SIZE as u32, ICON_SIZE as u32).context("build error icon")
}

fn empty_canvas() -> Vec<u8> {
    vec![0u8; ICON_SIZE * ICON_SIZE * 4]
}

fn set_pixel(canvas: &mut [u8], x: i32, y: i32, color: Rgba) {
    if x < 0 || y < 0 || x >= ICON_SIZE as i32 || y >= ICON_SIZE as i32 {
        return;
    }
    let idx = ((y as usize) * ICON_SIZE + (x as usize)) * 4;
    canvas[idx..idx + 4].copy_from_slice(&color);
}

fn draw_rect(canvas: &mut [u8], x: i32, y: i32, w: i32, h: i32, color: Rgba) {
    for yy in y..(y + h) {
        for xx in x..(x + w) {
            set_pixel(canvas, xx, yy, color);
        }
    }
}

fn draw_circle(canvas: &mut [u8], cx: i32, cy: i32, r: i32, color: Rgba) {
    let r2 = r * r;
    for y in (cy - r)..=(cy + r) {
        for x in (cx - r)..=(cx + r) {
            let dx = x - cx;
            let dy = y - cy;
            if dx * dx + dy * dy <= r2 {
                set_pixel(canvas, x, y, color);
            }
        }
    }
}

/// Clockwise angle from twelve o'clock as a fraction of a full turn.
fn turn_fraction(dx: i32, dy: i32) -> f32 {
    let ang = (dx as f32).atan2(-(dy as f32));
    ang.rem_euclid(std::f32::consts::TAU) / std::f32::consts::TAU
}

fn draw_sweep_ring(
    canvas: &mut [u8],
    cx: i32,
    cy: i32,
    r_outer: i32,
    r_inner: i32,
    sweep: &BorderSweep,
    offset: f32,
) {
    let r_outer2 = r_outer * r_outer;
    let r_inner2 = r_inner * r_inner;
    for y in (cy - r_outer)..=(cy + r_outer) {
        for x in (cx - r_outer)..=(cx + r_outer) {
            let dx = x - cx;
            let dy = y - cy;
            let dist2 = dx * dx + dy * dy;
            if dist2 <= r_outer2 && dist2 >= r_inner2 {
                set_pixel(canvas, x, y, sweep.color_at(offset, turn_fraction(dx, dy)));
            }
        }
    }
}

fn draw_wedge(canvas: &mut [u8], cx: i32, cy: i32, r: i32, angle: f32, color: Rgba) {
    let r2 = r * r;
    let limit = angle / std::f32::consts::TAU;
    for y in (cy - r)..=(cy + r) {
        for x in (cx - r)..=(cx + r) {
            let dx = x - cx;
            let dy = y - cy;
            if limit > 0.0 && dx * dx + dy * dy <= r2 && turn_fraction(dx, dy) <= limit {
                set_pixel(canvas, x, y, color);
            }
        }
    }
}

// What you SEE now:
// • The poster, centered and scaled to fit the window (resize the window freely).
// • Drag any element with the left mouse; drag its bottom-right square to resize.
// • G: new background   Q: new quote   E: export PNG   R / Shift+R: rotate held/last element
// • L: place the --logo image   X: remove logo   Enter: dismiss notice   ESC: quit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use minifb::Key;
use tracing_subscriber::EnvFilter;

use morning_poster::api::GenerationClient;
use morning_poster::config::{Cli, Command, Config};
use morning_poster::draw::{self, Drawer, MouseEdge};
use morning_poster::error::Error;
use morning_poster::export;
use morning_poster::inpaint;
use morning_poster::interaction::InteractionState;
use morning_poster::layout::{ElementId, POSTER_HEIGHT, POSTER_WIDTH};
use morning_poster::persist::SnapshotStore;
use morning_poster::session::{EditorSession, JobKind, NoticeLevel};
use morning_poster::types::FrameBuffer;

const BACKDROP: u32 = 0x00_E5_E7_EB; // gray around the poster
const RING_ACTIVE: u32 = 0x00_60_A5_FA; // blue ring while dragging
const RING_HOVER: u32 = 0x00_FF_FF_FF;
const ROTATE_STEP: f32 = 15.0;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_args(&cli.global)?;
    tracing::debug!(?config, "starting");

    match cli.command.unwrap_or(Command::Edit { width: 540, height: 980, logo: None }) {
        Command::Edit { width, height, logo } => run_editor(&config, width, height, logo),
        Command::Export { out } => run_export(&config, out),
        Command::Inpaint { input, output } => run_inpaint(&input, &output),
        Command::SetText { id, text } => {
            let mut session = open_session(&config)?;
            session.set_text(&ElementId::new(id), &text)?;
            Ok(())
        }
        Command::Logo { path, remove } => {
            let mut session = open_session(&config)?;
            match (path, remove) {
                (Some(path), _) => session.set_logo(&path)?,
                (None, true) => session.remove_logo()?,
                (None, false) => return Err(Error::Config("give a logo path or --remove".into())),
            }
            Ok(())
        }
        Command::Generate { background, quote } => run_generate(&config, background, quote),
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

fn open_session(config: &Config) -> Result<EditorSession, Error> {
    let generator = Arc::new(GenerationClient::new(&config.api_base, config.timeout)?);
    let store = SnapshotStore::new(&config.state_path);
    Ok(EditorSession::new(config.session_options(), store, generator, today()))
}

fn run_export(config: &Config, out: Option<PathBuf>) -> Result<(), Error> {
    let mut session = open_session(config)?;
    session.load_assets_blocking(config.timeout);
    let path = out.unwrap_or_else(|| PathBuf::from(export::default_file_name(today())));
    session.export(&path)?;
    println!("{}", path.display());
    Ok(())
}

fn run_inpaint(input: &Path, output: &Path) -> Result<(), Error> {
    let bytes = std::fs::read(input)?;
    let cleaned = inpaint::remove_watermark(&bytes);
    if cleaned == bytes {
        tracing::warn!(input = %input.display(), "could not process image, writing it unchanged");
    }
    export::write_atomic(output, &cleaned)?;
    Ok(())
}

fn run_generate(config: &Config, background: bool, quote: bool) -> Result<(), Error> {
    let mut session = open_session(config)?;
    // neither flag: do both
    let (background, quote) = if background || quote { (background, quote) } else { (true, true) };
    if background { session.request_background(); }
    if quote { session.request_quote(); }

    while session.is_loading(JobKind::Background) || session.is_loading(JobKind::Quote) {
        thread::sleep(Duration::from_millis(50));
        session.poll();
    }

    let mut failures = Vec::new();
    while let Some(notice) = session.dismiss_notice() {
        if notice.level == NoticeLevel::Error {
            failures.push(notice.message);
        }
    }
    if failures.is_empty() { Ok(()) } else { Err(Error::Generation(failures.join("; "))) }
}

fn run_editor(config: &Config, width: usize, height: usize, logo: Option<PathBuf>) -> Result<(), Error> {
    /* --- Session + window setup ---
       Visual: window opens with the saved (or default) poster. */
    let mut session = open_session(config)?;
    let mut drawer = Drawer::new("Morning Poster", width, height)?;

    /* --- Reusable screen buffer ---
       Visual: this is the image you actually see each frame. */
    let mut screen = FrameBuffer::new(width, height);

    /* --- Render caches ---
       Visual: nothing; the poster is only repainted when something on it changed. */
    let mut poster: Option<(u64, RgbaImage)> = None;
    let mut scaled: Option<(u64, u32, u32, RgbaImage)> = None;

    /* --- HUD / FPS --- */
    let mut last_fps_time = Instant::now();
    let mut frames_this_second: u32 = 0;
    let mut hud_fps_text = String::from("FPS: 0.0");

    /* ------------------------------ Main loop ------------------------------ */
    while drawer.is_open() && !drawer.esc_pressed() {
        let now = Instant::now();

        /* 1) Follow the window size.
           Visual: the poster re-centers and rescales as you drag the window edge. */
        let (w, h) = drawer.size();
        screen.resize(w.max(1), h.max(1));
        session.resize_viewport(w, h);

        /* 2) Finished generation jobs and image loads */
        session.poll();

        /* 3) Pointer: press starts a gesture, hold moves it, release ends it. */
        let mouse = drawer.mouse_pos();
        match drawer.poll_left() {
            MouseEdge::Pressed => {
                if let Some(p) = mouse { session.pointer_down(p); }
            }
            MouseEdge::Held => {
                if let Some(p) = mouse {
                    if let Err(e) = session.pointer_move(p) {
                        tracing::warn!(error = %e, "gesture update rejected");
                    }
                }
            }
            MouseEdge::Released => session.pointer_up(),
            MouseEdge::Up => {}
        }

        /* 4) Keys */
        if drawer.pressed_once(Key::G) { session.request_background(); }
        if drawer.pressed_once(Key::Q) { session.request_quote(); }
        if drawer.pressed_once(Key::E) {
            let path = PathBuf::from(export::default_file_name(today()));
            let _ = session.export(&path); // failure already became a notice
        }
        if drawer.pressed_once(Key::L) {
            match &logo {
                Some(path) => {
                    if let Err(e) = session.set_logo(path) {
                        tracing::error!(error = %e, "logo not loaded");
                    }
                }
                None => tracing::info!("start with --logo <file> to place a logo"),
            }
        }
        if drawer.pressed_once(Key::X) {
            if let Err(e) = session.remove_logo() {
                tracing::warn!(error = %e, "no logo to remove");
            }
        }
        if drawer.pressed_once(Key::R) {
            let step = if drawer.shift_down() { -ROTATE_STEP } else { ROTATE_STEP };
            if let Some(id) = session.selected().cloned() {
                if let Err(e) = session.rotate(&id, step) {
                    tracing::warn!(error = %e, "rotate failed");
                }
            }
        }
        if drawer.pressed_once(Key::Enter) { session.dismiss_notice(); }

        /* 5) Repaint the poster only when it changed, rescale only when needed. */
        let revision = session.revision();
        if poster.as_ref().map(|(r, _)| *r) != Some(revision) {
            poster = Some((revision, session.render()));
        }
        let view = session.viewport().transform();
        let sw = ((POSTER_WIDTH as f32 * view.scale).round() as u32).max(1);
        let sh = ((POSTER_HEIGHT as f32 * view.scale).round() as u32).max(1);
        let stale = scaled.as_ref().map(|(r, a, b, _)| (*r, *a, *b)) != Some((revision, sw, sh));
        if stale {
            if let Some((_, full)) = &poster {
                scaled = Some((revision, sw, sh, imageops::resize(full, sw, sh, FilterType::Triangle)));
            }
        }

        /* 6) Compose the frame: backdrop, poster, rings, HUD, notices. */
        screen.fill(BACKDROP);
        if let Some((_, _, _, img)) = &scaled {
            draw::blit(&mut screen, img, view.offset_x.round() as i32, view.offset_y.round() as i32);
        }

        let ring = match session.controller().state() {
            InteractionState::Dragging(id) | InteractionState::Resizing(id, _) => Some((id.clone(), RING_ACTIVE)),
            InteractionState::Idle => mouse.and_then(|p| session.hit_at(p)).map(|hit| (hit.id, RING_HOVER)),
        };
        if let Some((id, color)) = ring {
            if let Some((bounds, rotation)) = session.bounds_of(&id) {
                draw::draw_selection(&mut screen, &bounds, rotation, &view, color);
            }
        }

        draw_hud(&mut screen, &session, &hud_fps_text);

        /* 7) Present to the window (this is when the on-screen image updates). */
        drawer.present(&screen)?;

        /* 8) FPS counter (HUD, once per second) */
        frames_this_second += 1;
        if now.duration_since(last_fps_time) >= Duration::from_secs(1) {
            let secs = now.duration_since(last_fps_time).as_secs_f32();
            hud_fps_text = format!("FPS: {:.1}", frames_this_second as f32 / secs);
            frames_this_second = 0;
            last_fps_time = now;
        }
    }

    Ok(())
}

/// Hint bar on top, loading status, and the oldest notice as a banner at the bottom.
fn draw_hud(screen: &mut FrameBuffer, session: &EditorSession, fps: &str) {
    let width = screen.width as i32;
    draw::fill_rect(screen, 0, 0, width, 30, 0x00_1F_29_37);
    draw::draw_text_5x7(screen, 8, 4, "G: BACKGROUND  Q: QUOTE  E: EXPORT  R: ROTATE  L/X: LOGO", 0x00_FF_FF_FF);

    let mut status = Vec::new();
    if session.is_loading(JobKind::Background) { status.push("BACKGROUND..."); }
    if session.is_loading(JobKind::Quote) { status.push("QUOTE..."); }
    if session.assets_loading() { status.push("IMAGES..."); }
    status.push(fps);
    draw::draw_text_5x7(screen, 8, 17, &status.join("  "), 0x00_FB_BF_24);

    if let Some(notice) = session.notices().next() {
        let color = match notice.level {
            NoticeLevel::Error => 0x00_B9_1C_1C,
            NoticeLevel::Info => 0x00_15_80_3D,
        };
        let top = screen.height as i32 - 34;
        draw::fill_rect(screen, 0, top, width, 34, color);
        let fit = ((width - 16) / 6).max(0) as usize;
        let message: String = notice.message.chars().take(fit).collect();
        draw::draw_text_5x7(screen, 8, top + 6, &message, 0x00_FF_FF_FF);
        let hint = "ENTER: DISMISS";
        let hint_x = (width - 8 - draw::text_width_5x7(hint)).max(8);
        draw::draw_text_5x7(screen, hint_x, top + 20, hint, 0x00_FF_FF_FF);
    }
}

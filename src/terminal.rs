// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based capture surface viewer
//!
//! Shows the observable surface state and maps keys to surface signals.
//! Signals run on a background runtime so the screen keeps redrawing while
//! a permission prompt or a capture is pending.

use crate::errors::SurfaceError;
use crate::surface::{CaptureOutcome, CaptureSurfaceController, CaptureSurfaceState, SurfacePhase};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};
use std::io::{self, stdout};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{error, info};

/// Run the terminal viewer until the user quits
///
/// # Arguments
/// * `surface` - Surface to drive
/// * `photo_dir` - Where captures are written; without one they are only reported
pub fn run(
    surface: CaptureSurfaceController,
    photo_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &runtime, &surface, photo_dir.as_deref());

    // Release the camera before leaving the screen
    runtime.block_on(surface.close());

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Surface signals bound to keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Open,
    Close,
    Capture,
    ToggleFacing,
    ToggleTorch,
    Quit,
}

fn signal_for(code: KeyCode, modifiers: KeyModifiers) -> Option<Signal> {
    match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Signal::Quit),
        KeyCode::Char('q') => Some(Signal::Quit),
        KeyCode::Char('o') => Some(Signal::Open),
        KeyCode::Char('c') => Some(Signal::Close),
        KeyCode::Char(' ') => Some(Signal::Capture),
        KeyCode::Char('f') => Some(Signal::ToggleFacing),
        KeyCode::Char('t') => Some(Signal::ToggleTorch),
        _ => None,
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    runtime: &tokio::runtime::Runtime,
    surface: &CaptureSurfaceController,
    photo_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (report_tx, report_rx) = mpsc::channel::<String>();
    let mut last_report = String::from("Press 'o' to open the camera");

    loop {
        while let Ok(report) = report_rx.try_recv() {
            last_report = report;
        }

        let state = surface.state();
        terminal.draw(|f| {
            let area = f.area();

            let panel_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(2),
            };
            f.render_widget(
                SurfacePanel {
                    state: &state,
                    version: env!("GIT_VERSION"),
                },
                panel_area,
            );

            let report_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(2),
                width: area.width,
                height: 1,
            };
            f.render_widget(
                StatusBar {
                    message: &last_report,
                    background: Color::Black,
                },
                report_area,
            );

            let keys_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };
            let keys = build_key_hints(&state);
            f.render_widget(
                StatusBar {
                    message: &keys,
                    background: Color::DarkGray,
                },
                keys_area,
            );
        })?;

        let key = if event::poll(Duration::from_millis(50))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            key
        } else {
            continue;
        };

        let Some(signal) = signal_for(key.code, key.modifiers) else {
            continue;
        };
        info!(?signal, "Key signal");

        match signal {
            Signal::Quit => break,
            Signal::ToggleTorch => {
                let report = if surface.toggle_torch() {
                    "Torch toggled".to_string()
                } else {
                    "No torch available".to_string()
                };
                last_report = report;
            }
            signal => {
                let surface = surface.clone();
                let photo_dir = photo_dir.map(Path::to_path_buf);
                let report_tx = report_tx.clone();
                runtime.spawn(async move {
                    let report = dispatch(&surface, signal, photo_dir.as_deref()).await;
                    let _ = report_tx.send(report);
                });
            }
        }
    }

    Ok(())
}

/// Run one signal against the surface and describe the result
async fn dispatch(
    surface: &CaptureSurfaceController,
    signal: Signal,
    photo_dir: Option<&Path>,
) -> String {
    match signal {
        Signal::Open => match surface.open().await {
            Ok(phase) => format!("Surface {}", phase),
            Err(e) => describe_error(&e),
        },
        Signal::Close => {
            surface.close().await;
            "Surface closed".to_string()
        }
        Signal::ToggleFacing => match surface.toggle_facing_mode().await {
            Ok(true) => format!("Switched to {} camera", surface.state().facing),
            Ok(false) => "Cannot switch camera now".to_string(),
            Err(e) => describe_error(&e),
        },
        Signal::Capture => match surface.trigger_capture().await {
            Ok(CaptureOutcome::Captured(photo)) => match photo_dir {
                Some(dir) => match save_capture(dir, &photo).await {
                    Ok(path) => format!("Saved: {}", path.display()),
                    Err(e) => {
                        error!(error = %e, "Failed to save photo");
                        format!("Error: {}", e)
                    }
                },
                None => format!(
                    "Captured {}x{} ({} bytes)",
                    photo.width,
                    photo.height,
                    photo.image_data.len()
                ),
            },
            Ok(CaptureOutcome::Ignored) => "Capture ignored".to_string(),
            Ok(CaptureOutcome::Discarded) => "Capture discarded".to_string(),
            Err(e) => describe_error(&e),
        },
        Signal::ToggleTorch | Signal::Quit => String::new(),
    }
}

fn describe_error(err: &SurfaceError) -> String {
    format!("Error: {}", err)
}

async fn save_capture(
    dir: &Path,
    photo: &crate::pipelines::photo::CaptureResult,
) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(photo.file_name());
    tokio::fs::write(&path, &photo.image_data).await?;
    info!(path = %path.display(), "Photo saved");
    Ok(path)
}

fn build_key_hints(state: &CaptureSurfaceState) -> String {
    let mut msg = match state.phase {
        SurfacePhase::Ready => "space capture".to_string(),
        SurfacePhase::Closed | SurfacePhase::Denied | SurfacePhase::Blocked => {
            "'o' open".to_string()
        }
        SurfacePhase::Initializing | SurfacePhase::Capturing => "working...".to_string(),
    };
    if state.phase == SurfacePhase::Ready && state.can_switch_facing {
        msg.push_str(" | 'f' flip");
    }
    if state.capabilities.has_torch {
        msg.push_str(" | 't' torch");
    }
    msg.push_str(" | 'c' close | 'q' quit");
    msg
}

/// Widget listing the surface state
struct SurfacePanel<'a> {
    state: &'a CaptureSurfaceState,
    version: &'a str,
}

impl SurfacePanel<'_> {
    fn lines(&self) -> Vec<(String, Style)> {
        let state = self.state;
        let plain = Style::default();
        let phase_color = match state.phase {
            SurfacePhase::Ready => Color::Green,
            SurfacePhase::Capturing | SurfacePhase::Initializing => Color::Yellow,
            SurfacePhase::Denied | SurfacePhase::Blocked => Color::Red,
            SurfacePhase::Closed => Color::Gray,
        };

        let torch = match (state.capabilities.has_torch, state.capabilities.torch_enabled) {
            (false, _) => "unavailable",
            (true, false) => "off",
            (true, true) => "on",
        };

        let mut lines = vec![
            (format!("Capture Surface {}", self.version), plain.fg(Color::Cyan)),
            (String::new(), plain),
            (format!("Phase:       {}", state.phase), plain.fg(phase_color)),
            (format!("Permission:  {}", state.permission), plain),
            (format!("Camera:      {}", state.facing), plain),
            (format!("Torch:       {}", torch), plain),
        ];

        if let Some(notice) = &state.notice {
            lines.push((String::new(), plain));
            lines.push((format!("Notice: {}", notice), plain.fg(Color::Yellow)));
        }

        if let Some(err) = &state.error {
            lines.push((String::new(), plain));
            lines.push((err.to_string(), plain.fg(Color::Red)));
            lines.push((err.remediation().to_string(), plain));
        }

        lines
    }
}

impl Widget for SurfacePanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for (row, (text, style)) in self.lines().into_iter().enumerate() {
            let y = area.y + 1 + row as u16;
            if y >= area.y + area.height {
                break;
            }
            let text: String = text.chars().take(area.width.saturating_sub(2) as usize).collect();
            buf.set_string(area.x + 1, y, text, style);
        }
    }
}

/// Single-line status bar widget
struct StatusBar<'a> {
    message: &'a str,
    background: Color,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(self.background);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            Style::default().fg(Color::White).bg(self.background),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::CapabilitySet;

    #[test]
    fn test_key_mapping() {
        assert_eq!(
            signal_for(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(Signal::Quit)
        );
        assert_eq!(
            signal_for(KeyCode::Char('c'), KeyModifiers::NONE),
            Some(Signal::Close)
        );
        assert_eq!(
            signal_for(KeyCode::Char(' '), KeyModifiers::NONE),
            Some(Signal::Capture)
        );
        assert_eq!(signal_for(KeyCode::Char('x'), KeyModifiers::NONE), None);
    }

    #[test]
    fn test_key_hints_follow_capabilities() {
        let mut state = CaptureSurfaceState {
            phase: SurfacePhase::Ready,
            can_switch_facing: true,
            ..CaptureSurfaceState::default()
        };
        let hints = build_key_hints(&state);
        assert!(hints.contains("flip"));
        assert!(!hints.contains("torch"));

        state.capabilities = CapabilitySet {
            has_torch: true,
            torch_enabled: false,
        };
        assert!(build_key_hints(&state).contains("torch"));
    }

    #[test]
    fn test_panel_shows_remediation() {
        let state = CaptureSurfaceState {
            phase: SurfacePhase::Blocked,
            error: Some(SurfaceError::PermissionBlocked),
            ..CaptureSurfaceState::default()
        };
        let panel = SurfacePanel {
            state: &state,
            version: "test",
        };
        let lines = panel.lines();
        assert!(
            lines
                .iter()
                .any(|(text, _)| text == SurfaceError::PermissionBlocked.remediation())
        );
    }
}

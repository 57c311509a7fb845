//! Streamflix - desktop client

// Hide console window on Windows release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use eframe::egui;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use streamflix::config::AppConfig;

mod app;

use app::StreamflixApp;

/// Red rounded tile with a white play triangle
fn load_icon() -> egui::IconData {
    let size: usize = 64;
    let mut rgba = vec![0u8; size * size * 4];

    for y in 0..size {
        for x in 0..size {
            let idx = (y * size + x) * 4;
            let nx = x as f32 / size as f32;
            let ny = y as f32 / size as f32;

            let corner_radius = 0.125;
            let dx = (corner_radius - nx).max(nx - (1.0 - corner_radius)).max(0.0);
            let dy = (corner_radius - ny).max(ny - (1.0 - corner_radius)).max(0.0);
            if dx * dx + dy * dy > corner_radius * corner_radius {
                continue;
            }

            // Triangle pointing right, centred
            let in_play = nx >= 0.36 && nx <= 0.72 && (ny - 0.5).abs() <= (0.72 - nx) * 0.85;
            let (r, g, b) = if in_play { (255, 255, 255) } else { (229, 9, 20) };
            rgba[idx] = r;
            rgba[idx + 1] = g;
            rgba[idx + 2] = b;
            rgba[idx + 3] = 255;
        }
    }

    egui::IconData { rgba, width: size as u32, height: size as u32 }
}

/// Append a system emoji font to the proportional family when one exists.
fn load_emoji_font(fonts: &mut egui::FontDefinitions) {
    #[cfg(target_os = "windows")]
    let paths: &[&str] = &["C:\\Windows\\Fonts\\seguiemj.ttf"];
    #[cfg(target_os = "linux")]
    let paths: &[&str] = &[
        "/usr/share/fonts/truetype/noto/NotoColorEmoji.ttf",
        "/usr/share/fonts/noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/google-noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    ];
    #[cfg(target_os = "macos")]
    let paths: &[&str] = &["/System/Library/Fonts/Apple Color Emoji.ttc"];
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    let paths: &[&str] = &[];

    for path in paths {
        if let Ok(font_data) = std::fs::read(path) {
            fonts.font_data.insert("emoji".to_owned(), egui::FontData::from_owned(font_data).into());
            fonts.families
                .entry(egui::FontFamily::Proportional)
                .or_default()
                .push("emoji".to_owned());
            tracing::debug!(path = *path, "loaded emoji font");
            break;
        }
    }
}

fn main() -> Result<(), eframe::Error> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "streamflix=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load();
    tracing::info!(api = %config.api_base_url, "starting Streamflix {}", env!("CARGO_PKG_VERSION"));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1250.0, 720.0])
            .with_min_inner_size([900.0, 550.0])
            .with_icon(load_icon()),
        vsync: true,
        hardware_acceleration: eframe::HardwareAcceleration::Preferred,
        ..Default::default()
    };

    eframe::run_native(
        "Streamflix",
        options,
        Box::new(move |cc| {
            let mut fonts = egui::FontDefinitions::default();
            load_emoji_font(&mut fonts);
            cc.egui_ctx.set_fonts(fonts);

            cc.egui_ctx.set_visuals(if config.dark_mode { egui::Visuals::dark() } else { egui::Visuals::light() });
            Ok(Box::new(StreamflixApp::new(cc.egui_ctx.clone(), config)))
        }),
    )
}

//! External player and browser launching

use std::io;
use std::process::{Child, Command, Stdio};
use std::thread;

use tracing::{debug, warn};

/// Player-independent launch settings.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub buffer_secs: u32,
    pub hw_accel: bool,
    /// Sent to the player when set.
    pub user_agent: Option<String>,
}

/// Player named "internal" means the built-in decoder.
pub fn is_internal(player: &str) -> bool {
    player.trim().eq_ignore_ascii_case("internal")
}

/// Resolve bare player names to their usual install locations on Windows.
pub fn resolve_player(player: &str) -> String {
    let player = if player.trim().is_empty() { "ffplay" } else { player.trim() };

    #[cfg(target_os = "windows")]
    {
        let lower = player.to_lowercase();
        let candidates: &[&str] = match lower.as_str() {
            "vlc" | "vlc.exe" => &[
                r"C:\Program Files\VideoLAN\VLC\vlc.exe",
                r"C:\Program Files (x86)\VideoLAN\VLC\vlc.exe",
            ],
            "mpv" | "mpv.exe" => &[
                r"C:\Program Files\mpv\mpv.exe",
                r"C:\Program Files (x86)\mpv\mpv.exe",
                r"C:\mpv\mpv.exe",
            ],
            "ffplay" | "ffplay.exe" => &[
                r"C:\ffmpeg\bin\ffplay.exe",
                r"C:\Program Files\ffmpeg\bin\ffplay.exe",
            ],
            _ => &[],
        };
        if let Some(found) = candidates.iter().find(|p| std::path::Path::new(p).exists()) {
            return found.to_string();
        }
    }

    player.to_string()
}

/// Window title: item title plus the last path segment of the stream.
fn window_title(title: &str, url: &str) -> String {
    let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url);
    let stream_name = path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("stream");
    format!("{} - {}", title, stream_name)
}

/// Command-line arguments for `player` playing `url`.
pub fn build_args(player: &str, title: &str, url: &str, opts: &LaunchOptions) -> Vec<String> {
    let lower = player.to_lowercase();
    let buffer_ms = opts.buffer_secs as u64 * 1000;
    let probe_bytes = opts.buffer_secs as u64 * 4 * 1024 * 1024;
    let title = window_title(title, url);

    if lower.contains("ffplay") {
        // ffplay takes the input first, no -i
        let mut args = vec![
            url.to_string(),
            "-autoexit".to_string(),
            "-probesize".to_string(),
            probe_bytes.to_string(),
            "-analyzeduration".to_string(),
            (buffer_ms * 2000).to_string(),
            "-sync".to_string(),
            "audio".to_string(),
            "-framedrop".to_string(),
            "-window_title".to_string(),
            title,
        ];
        if url.starts_with("http") {
            args.extend([
                "-reconnect".to_string(),
                "1".to_string(),
                "-reconnect_streamed".to_string(),
                "1".to_string(),
                "-reconnect_delay_max".to_string(),
                "10".to_string(),
            ]);
        }
        if let Some(ref ua) = opts.user_agent {
            args.extend(["-user_agent".to_string(), ua.clone()]);
        }
        // Windows: hwaccel gives a black screen with the Vulkan renderer
        if opts.hw_accel && !cfg!(target_os = "windows") {
            let api = if cfg!(target_os = "macos") { "videotoolbox" } else { "auto" };
            args.insert(0, api.to_string());
            args.insert(0, "-hwaccel".to_string());
        }
        args
    } else if lower.contains("mpv") {
        let cache_secs = opts.buffer_secs * 2;
        let cache_mb = opts.buffer_secs * 4;
        let mut args = vec![
            url.to_string(),
            format!("--title={}", title),
            "--cache=yes".to_string(),
            format!("--cache-secs={}", cache_secs),
            format!("--demuxer-readahead-secs={}", cache_secs),
            format!("--demuxer-max-bytes={}M", cache_mb),
            "--cache-pause-initial=yes".to_string(),
            "--network-timeout=60".to_string(),
            "--stream-lavf-o=reconnect=1".to_string(),
            "--stream-lavf-o=reconnect_streamed=1".to_string(),
            "--keep-open=no".to_string(),
            "--ytdl=no".to_string(),
        ];
        if opts.hw_accel {
            args.push("--hwdec=auto-safe".to_string());
        } else {
            args.push("--hwdec=no".to_string());
        }
        if let Some(ref ua) = opts.user_agent {
            args.push(format!("--user-agent={}", ua));
        }
        args
    } else if lower.contains("vlc") {
        let cache_ms = buffer_ms * 2;
        let mut args = vec![
            url.to_string(),
            format!("--meta-title={}", title),
            format!("--network-caching={}", cache_ms),
            "--http-reconnect".to_string(),
            "--play-and-exit".to_string(),
        ];
        if opts.hw_accel {
            args.push("--avcodec-hw=any".to_string());
        }
        if let Some(ref ua) = opts.user_agent {
            args.push(format!("--http-user-agent={}", ua));
        }
        args
    } else {
        // Generic player - just pass URL
        vec![url.to_string()]
    }
}

/// Spawn `player` for `url`. Stderr is piped for the caller to read.
pub fn spawn_player(player: &str, title: &str, url: &str, opts: &LaunchOptions) -> io::Result<Child> {
    let program = resolve_player(player);
    let args = build_args(&program, title, url, opts);
    debug!(player = %program, ?args, "spawning player");

    let mut cmd = Command::new(&program);
    cmd.args(&args);

    // Hide the console window for ffplay on Windows
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        if program.to_lowercase().contains("ffplay") {
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
    }

    if let Some(ref ua) = opts.user_agent {
        cmd.env("USER_AGENT", ua);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());
    cmd.spawn()
}

/// Kill a child and reap it.
pub fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Leave a child running and reap it in the background once it exits.
pub fn detach(mut child: Child) {
    thread::spawn(move || {
        if let Err(e) = child.wait() {
            warn!(error = %e, "failed to wait for player");
        }
    });
}

/// Open `url` with the desktop's default handler.
pub fn open_in_browser(url: &str) -> io::Result<()> {
    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]).arg(url);
        c
    };
    #[cfg(target_os = "macos")]
    let mut cmd = {
        let mut c = Command::new("open");
        c.arg(url);
        c
    };
    #[cfg(all(unix, not(target_os = "macos")))]
    let mut cmd = {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };

    let child = cmd.stdout(Stdio::null()).stderr(Stdio::null()).spawn()?;
    detach(child);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://cdn.example.com/hls/master.m3u8?token=1";

    fn opts() -> LaunchOptions {
        LaunchOptions { buffer_secs: 5, hw_accel: false, user_agent: None }
    }

    #[test]
    fn test_is_internal() {
        assert!(is_internal("internal"));
        assert!(is_internal(" Internal "));
        assert!(!is_internal("mpv"));
    }

    #[test]
    fn test_empty_player_defaults_to_ffplay() {
        assert!(resolve_player("").contains("ffplay"));
        assert!(resolve_player("  ").contains("ffplay"));
    }

    #[test]
    fn test_window_title_uses_last_segment() {
        assert_eq!(window_title("Heat", URL), "Heat - master.m3u8");
        assert_eq!(window_title("Heat", "https://host.example/"), "Heat - host.example");
    }

    #[test]
    fn test_ffplay_args() {
        let args = build_args("ffplay", "Heat", URL, &opts());
        assert_eq!(args[0], URL);
        assert!(args.contains(&"-autoexit".to_string()));
        assert!(args.contains(&"-reconnect".to_string()));
        assert!(!args.contains(&"-user_agent".to_string()));
        assert!(!args.contains(&"-hwaccel".to_string()));
    }

    #[test]
    fn test_user_agent_passed_only_when_set() {
        let mut o = opts();
        o.user_agent = Some("Streamflix/1.0".to_string());
        let args = build_args("/usr/bin/ffplay", "Heat", URL, &o);
        let pos = args.iter().position(|a| a == "-user_agent").unwrap();
        assert_eq!(args[pos + 1], "Streamflix/1.0");

        let args = build_args("mpv", "Heat", URL, &o);
        assert!(args.contains(&"--user-agent=Streamflix/1.0".to_string()));
    }

    #[test]
    fn test_mpv_hw_accel_toggle() {
        let mut o = opts();
        assert!(build_args("mpv", "Heat", URL, &o).contains(&"--hwdec=no".to_string()));
        o.hw_accel = true;
        let args = build_args("mpv.exe", "Heat", URL, &o);
        assert!(args.contains(&"--hwdec=auto-safe".to_string()));
        assert!(args.contains(&"--cache-secs=10".to_string()));
    }

    #[test]
    fn test_vlc_args() {
        let args = build_args("vlc", "Heat", URL, &opts());
        assert_eq!(args[0], URL);
        assert!(args.contains(&"--meta-title=Heat - master.m3u8".to_string()));
        assert!(args.contains(&"--network-caching=10000".to_string()));
    }

    #[test]
    fn test_generic_player_gets_only_url() {
        assert_eq!(build_args("celluloid-x", "Heat", URL, &opts()), vec![URL.to_string()]);
    }
}

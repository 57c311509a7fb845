// Built-in video player using ffmpeg-next
// Requires FFmpeg libraries: libavcodec, libavformat, libavutil, libswscale
//
// To install FFmpeg development libraries:
// - Ubuntu/Debian: sudo apt install libavcodec-dev libavformat-dev libavutil-dev libswscale-dev libavdevice-dev
// - Fedora: sudo dnf install ffmpeg-devel
// - macOS: brew install ffmpeg
// - Windows: Download from https://ffmpeg.org and set FFMPEG_DIR environment variable
//
// libavformat demuxes HLS manifests itself, so with this player enabled
// adaptive streams need no helper process.

/// Whether this build carries the built-in decoder.
pub const AVAILABLE: bool = cfg!(feature = "internal-player");

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerState {
    Stopped,
    Loading,
    Playing,
    Paused,
    Error(String),
}

/// Decoded RGB24 frame for rendering
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Messages from the decode thread
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerMessage {
    /// First frame decoded.
    Ready,
    Error(String),
    Finished,
}

#[cfg(feature = "internal-player")]
mod player_impl {
    use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    extern crate ffmpeg_next as ffmpeg;
    use ffmpeg::format::Pixel;
    use ffmpeg::media::Type;
    use ffmpeg::software::scaling::{context::Context as ScalingContext, flag::Flags};
    use ffmpeg::util::frame::video::Video as VideoFrame;

    use super::{DecodedFrame, PlayerMessage, PlayerState};

    enum PlayerCommand {
        Stop,
        Pause,
        Resume,
    }

    fn set_state(state: &Mutex<PlayerState>, next: PlayerState) {
        if let Ok(mut s) = state.lock() {
            *s = next;
        }
    }

    fn fail(state: &Mutex<PlayerState>, msg_tx: &Sender<PlayerMessage>, message: String) {
        tracing::warn!(error = %message, "internal player failed");
        set_state(state, PlayerState::Error(message.clone()));
        let _ = msg_tx.send(PlayerMessage::Error(message));
    }

    pub struct InternalPlayer {
        state: Arc<Mutex<PlayerState>>,
        command_sender: Option<Sender<PlayerCommand>>,
        message_receiver: Option<Receiver<PlayerMessage>>,
        current_frame: Arc<Mutex<Option<DecodedFrame>>>,
        url: String,
        title: String,
    }

    impl InternalPlayer {
        pub fn new() -> Self {
            ffmpeg::init().ok();

            Self {
                state: Arc::new(Mutex::new(PlayerState::Stopped)),
                command_sender: None,
                message_receiver: None,
                current_frame: Arc::new(Mutex::new(None)),
                url: String::new(),
                title: String::new(),
            }
        }

        pub fn state(&self) -> PlayerState {
            self.state
                .lock()
                .map(|s| s.clone())
                .unwrap_or(PlayerState::Stopped)
        }

        /// Latest decoded frame, if a new one arrived
        pub fn take_frame(&self) -> Option<DecodedFrame> {
            self.current_frame.lock().ok().and_then(|mut f| f.take())
        }

        pub fn poll_messages(&mut self) -> Vec<PlayerMessage> {
            let mut messages = Vec::new();
            if let Some(ref receiver) = self.message_receiver {
                loop {
                    match receiver.try_recv() {
                        Ok(msg) => messages.push(msg),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            self.message_receiver = None;
                            break;
                        }
                    }
                }
            }
            messages
        }

        pub fn play(&mut self, title: &str, url: &str, user_agent: &str) {
            self.stop();
            self.url = url.to_string();
            self.title = title.to_string();

            set_state(&self.state, PlayerState::Loading);

            let (cmd_tx, cmd_rx) = channel();
            let (msg_tx, msg_rx) = channel();
            self.command_sender = Some(cmd_tx);
            self.message_receiver = Some(msg_rx);

            let url = url.to_string();
            let user_agent = user_agent.to_string();
            let state = Arc::clone(&self.state);
            let current_frame = Arc::clone(&self.current_frame);

            thread::spawn(move || {
                Self::decode_thread(url, user_agent, state, current_frame, cmd_rx, msg_tx);
            });
        }

        fn decode_thread(
            url: String,
            user_agent: String,
            state: Arc<Mutex<PlayerState>>,
            current_frame: Arc<Mutex<Option<DecodedFrame>>>,
            cmd_rx: Receiver<PlayerCommand>,
            msg_tx: Sender<PlayerMessage>,
        ) {
            let mut options = ffmpeg::Dictionary::new();
            if !user_agent.is_empty() {
                options.set("user_agent", &user_agent);
            }
            options.set("reconnect", "1");
            options.set("reconnect_streamed", "1");
            options.set("reconnect_delay_max", "5");
            options.set("timeout", "10000000"); // 10 second socket timeout

            let mut ictx = match ffmpeg::format::input_with_dictionary(&url, options) {
                Ok(ctx) => ctx,
                Err(e) => return fail(&state, &msg_tx, format!("Failed to open stream: {}", e)),
            };

            let Some(video_stream) = ictx.streams().best(Type::Video) else {
                return fail(&state, &msg_tx, "No video stream found".to_string());
            };
            let video_stream_index = video_stream.index();

            let decoder = ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
                .and_then(|c| c.decoder().video());
            let mut decoder = match decoder {
                Ok(d) => d,
                Err(e) => return fail(&state, &msg_tx, format!("Failed to create decoder: {}", e)),
            };

            let width = decoder.width();
            let height = decoder.height();

            // Scale down to at most 720p for the texture upload
            let (target_width, target_height) = if width > 1280 || height > 720 {
                let scale = f64::min(1280.0 / width as f64, 720.0 / height as f64);
                ((width as f64 * scale) as u32, (height as f64 * scale) as u32)
            } else {
                (width, height)
            };

            let mut scaler = match ScalingContext::get(
                decoder.format(),
                width,
                height,
                Pixel::RGB24,
                target_width,
                target_height,
                Flags::BILINEAR,
            ) {
                Ok(s) => s,
                Err(e) => return fail(&state, &msg_tx, format!("Failed to create scaler: {}", e)),
            };

            let mut paused = false;
            let mut ready = false;
            let frame_duration = Duration::from_secs_f64(1.0 / 30.0);
            let mut last_frame_time = Instant::now();

            for (stream, packet) in ictx.packets() {
                match cmd_rx.try_recv() {
                    Ok(PlayerCommand::Stop) => return,
                    Ok(PlayerCommand::Pause) => {
                        paused = true;
                        set_state(&state, PlayerState::Paused);
                    }
                    Ok(PlayerCommand::Resume) => {
                        paused = false;
                        set_state(&state, PlayerState::Playing);
                    }
                    Err(_) => {}
                }

                if paused {
                    thread::sleep(Duration::from_millis(50));
                    continue;
                }
                if stream.index() != video_stream_index {
                    continue;
                }
                if decoder.send_packet(&packet).is_err() {
                    continue;
                }

                let mut decoded = VideoFrame::empty();
                while decoder.receive_frame(&mut decoded).is_ok() {
                    let mut rgb_frame = VideoFrame::empty();
                    if scaler.run(&decoded, &mut rgb_frame).is_err() {
                        continue;
                    }
                    let data = rgb_frame.data(0);
                    let stride = rgb_frame.stride(0);
                    let row_len = target_width as usize * 3;

                    let mut frame_data = Vec::with_capacity(row_len * target_height as usize);
                    for y in 0..target_height as usize {
                        let row_start = y * stride;
                        frame_data.extend_from_slice(&data[row_start..row_start + row_len]);
                    }

                    if let Ok(mut slot) = current_frame.lock() {
                        *slot = Some(DecodedFrame {
                            width: target_width,
                            height: target_height,
                            data: frame_data,
                        });
                    }

                    if !ready {
                        ready = true;
                        set_state(&state, PlayerState::Playing);
                        let _ = msg_tx.send(PlayerMessage::Ready);
                    }

                    let elapsed = last_frame_time.elapsed();
                    if elapsed < frame_duration {
                        thread::sleep(frame_duration - elapsed);
                    }
                    last_frame_time = Instant::now();
                }
            }

            if ready {
                set_state(&state, PlayerState::Stopped);
                let _ = msg_tx.send(PlayerMessage::Finished);
            } else {
                fail(&state, &msg_tx, "Stream ended before any video was decoded".to_string());
            }
        }

        pub fn stop(&mut self) {
            if let Some(ref sender) = self.command_sender {
                let _ = sender.send(PlayerCommand::Stop);
            }
            self.command_sender = None;
            self.message_receiver = None;
            set_state(&self.state, PlayerState::Stopped);
            if let Ok(mut f) = self.current_frame.lock() {
                *f = None;
            }
        }

        pub fn toggle_pause(&mut self) {
            if let Some(ref sender) = self.command_sender {
                match self.state() {
                    PlayerState::Playing => {
                        let _ = sender.send(PlayerCommand::Pause);
                    }
                    PlayerState::Paused => {
                        let _ = sender.send(PlayerCommand::Resume);
                    }
                    _ => {}
                }
            }
        }

        pub fn current_url(&self) -> &str {
            &self.url
        }

        pub fn title(&self) -> &str {
            &self.title
        }
    }

    impl Drop for InternalPlayer {
        fn drop(&mut self) {
            self.stop();
        }
    }
}

// Stub implementation when internal-player feature is disabled
#[cfg(not(feature = "internal-player"))]
mod player_impl {
    use super::{DecodedFrame, PlayerMessage, PlayerState};

    pub struct InternalPlayer {
        state: PlayerState,
        title: String,
        pending: Vec<PlayerMessage>,
    }

    impl InternalPlayer {
        pub fn new() -> Self {
            Self {
                state: PlayerState::Stopped,
                title: String::new(),
                pending: Vec::new(),
            }
        }

        pub fn state(&self) -> PlayerState {
            self.state.clone()
        }

        pub fn take_frame(&self) -> Option<DecodedFrame> {
            None
        }

        pub fn poll_messages(&mut self) -> Vec<PlayerMessage> {
            std::mem::take(&mut self.pending)
        }

        pub fn play(&mut self, title: &str, _url: &str, _user_agent: &str) {
            let message = "Internal player not enabled. Build with --features internal-player".to_string();
            self.title = title.to_string();
            self.state = PlayerState::Error(message.clone());
            self.pending.push(PlayerMessage::Error(message));
        }

        pub fn stop(&mut self) {
            self.state = PlayerState::Stopped;
            self.pending.clear();
        }

        pub fn toggle_pause(&mut self) {}
        pub fn current_url(&self) -> &str { "" }
        pub fn title(&self) -> &str { &self.title }
    }
}

pub use player_impl::InternalPlayer;

/// Player panel embedded in the watch view
pub struct PlayerWindow {
    pub player: InternalPlayer,
    pub texture: Option<egui::TextureHandle>,
    last_error: Option<String>,
}

impl PlayerWindow {
    pub fn new() -> Self {
        Self {
            player: InternalPlayer::new(),
            texture: None,
            last_error: None,
        }
    }

    pub fn play(&mut self, title: &str, url: &str, user_agent: &str) {
        self.last_error = None;
        self.texture = None;
        self.player.play(title, url, user_agent);
    }

    pub fn stop(&mut self) {
        self.player.stop();
        self.texture = None;
    }

    /// Drain decode-thread messages, remembering the last error for display.
    pub fn pump(&mut self) -> Vec<PlayerMessage> {
        let messages = self.player.poll_messages();
        for msg in &messages {
            if let PlayerMessage::Error(e) = msg {
                self.last_error = Some(e.clone());
            }
        }
        messages
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.player.state(), PlayerState::Playing | PlayerState::Loading)
    }

    /// Render the latest frame and the transport controls.
    pub fn show(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        if let Some(frame) = self.player.take_frame() {
            let image = egui::ColorImage::from_rgb([frame.width as usize, frame.height as usize], &frame.data);
            self.texture = Some(ctx.load_texture("video_frame", image, egui::TextureOptions::LINEAR));
        }

        ui.vertical_centered(|ui| {
            if let Some(ref texture) = self.texture {
                let available = ui.available_size();
                let tex_size = texture.size_vec2();
                let aspect = tex_size.x / tex_size.y;
                let (width, height) = if available.x / available.y.max(1.0) > aspect {
                    (available.y * aspect * 0.9, available.y * 0.9)
                } else {
                    (available.x * 0.9, available.x / aspect * 0.9)
                };
                ui.image((texture.id(), egui::vec2(width, height)));
            } else {
                ui.add_space(50.0);
                match self.player.state() {
                    PlayerState::Loading => {
                        ui.spinner();
                        ui.label("Connecting to stream...");
                    }
                    PlayerState::Error(ref e) => {
                        ui.colored_label(egui::Color32::RED, format!("Error: {}", e));
                    }
                    _ => {
                        if let Some(ref error) = self.last_error {
                            ui.colored_label(egui::Color32::RED, format!("Error: {}", error));
                        }
                    }
                }
            }
        });

        ui.horizontal(|ui| {
            ui.label(self.player.title());
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("⏹ Stop").clicked() {
                    self.stop();
                }
                let pause_text = if matches!(self.player.state(), PlayerState::Paused) {
                    "▶ Play"
                } else {
                    "⏸ Pause"
                };
                if ui.button(pause_text).clicked() {
                    self.player.toggle_pause();
                }
            });
        });

        if self.is_playing() {
            ctx.request_repaint();
        }
    }
}

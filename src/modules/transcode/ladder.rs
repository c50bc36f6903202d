//! Adaptive-bitrate ladder and the single ffmpeg invocation that renders it.

use std::path::Path;

pub const SEGMENT_SECONDS: u32 = 6;
pub const AUDIO_PLAYLIST: &str = "audio.m3u8";
pub const MASTER_PLAYLIST: &str = "master.m3u8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub width: u32,
    pub height: u32,
    pub video_kbps: u32,
    pub audio_kbps: u32,
}

impl Profile {
    /// Peak bits per second advertised in the master playlist.
    pub fn bandwidth(&self) -> u64 {
        (u64::from(self.video_kbps) + u64::from(self.audio_kbps)) * 1000
    }

    pub fn playlist_name(&self) -> String {
        format!("{}p.m3u8", self.height)
    }

    pub fn segment_pattern(&self) -> String {
        format!("{}p_%03d.ts", self.height)
    }

    fn label(&self) -> String {
        format!("v{}", self.height)
    }
}

/// Renditions in playlist order.
pub const PROFILES: [Profile; 5] = [
    Profile { width: 256, height: 144, video_kbps: 200, audio_kbps: 64 },
    Profile { width: 640, height: 360, video_kbps: 800, audio_kbps: 96 },
    Profile { width: 854, height: 480, video_kbps: 1500, audio_kbps: 128 },
    Profile { width: 1280, height: 720, video_kbps: 3000, audio_kbps: 192 },
    Profile { width: 1920, height: 1080, video_kbps: 5000, audio_kbps: 192 },
];

/// Bitrate of the shared audio rendition.
pub fn audio_kbps(profiles: &[Profile]) -> u32 {
    profiles.iter().map(|p| p.audio_kbps).max().unwrap_or(128)
}

/// `[0:v]split=N[s144][s360]...;[s144]scale=...,pad=...[v144];...`
pub fn filter_graph(profiles: &[Profile]) -> String {
    let mut graph = format!("[0:v]split={}", profiles.len());
    for p in profiles {
        graph.push_str(&format!("[s{}]", p.height));
    }

    for p in profiles {
        graph.push_str(&format!(
            ";[s{h}]scale=w={w}:h={h}:force_original_aspect_ratio=decrease,pad=w={w}:h={h}:x=(ow-iw)/2:y=(oh-ih)/2[{label}]",
            w = p.width,
            h = p.height,
            label = p.label(),
        ));
    }
    graph
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Full argument vector for rendering `profiles` from `input` into `output_dir`.
/// The audio rendition is only emitted when the source has an audio stream.
pub fn hls_args(input: &Path, output_dir: &Path, profiles: &[Profile], with_audio: bool) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-i".into(),
        path_arg(input),
        "-filter_complex".into(),
        filter_graph(profiles),
    ];

    for p in profiles {
        let kbps = format!("{}k", p.video_kbps);
        args.extend([
            "-map".into(),
            format!("[{}]", p.label()),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-b:v".into(),
            kbps.clone(),
            "-maxrate".into(),
            kbps,
            "-bufsize".into(),
            format!("{}k", p.video_kbps * 2),
            "-force_key_frames".into(),
            format!("expr:gte(t,n_forced*{})", SEGMENT_SECONDS),
            "-an".into(),
        ]);
        args.extend(hls_output(output_dir, &p.segment_pattern(), &p.playlist_name()));
    }

    if !with_audio {
        return args;
    }

    args.extend([
        "-map".into(),
        "0:a:0?".into(),
        "-vn".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        format!("{}k", audio_kbps(profiles)),
    ]);
    args.extend(hls_output(output_dir, "audio_%03d.ts", AUDIO_PLAYLIST));

    args
}

fn hls_output(output_dir: &Path, segment_pattern: &str, playlist: &str) -> Vec<String> {
    vec![
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        SEGMENT_SECONDS.to_string(),
        "-hls_playlist_type".into(),
        "vod".into(),
        "-hls_segment_filename".into(),
        path_arg(&output_dir.join(segment_pattern)),
        path_arg(&output_dir.join(playlist)),
    ]
}

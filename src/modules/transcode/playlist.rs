use super::ladder::{AUDIO_PLAYLIST, Profile};

const AUDIO_GROUP: &str = "audio";

/// Master playlist over `profiles`. Variants reference the shared audio
/// rendition only when one was rendered.
pub fn master_playlist(profiles: &[Profile], with_audio: bool) -> String {
    let mut content = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    if with_audio {
        content.push_str(&format!(
            "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"{}\",NAME=\"default\",DEFAULT=YES,AUTOSELECT=YES,URI=\"{}\"\n",
            AUDIO_GROUP, AUDIO_PLAYLIST
        ));
    }

    for p in profiles {
        content.push_str(&format!("#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}", p.bandwidth(), p.width, p.height));
        if with_audio {
            content.push_str(&format!(",AUDIO=\"{}\"", AUDIO_GROUP));
        }
        content.push_str(&format!("\n{}\n", p.playlist_name()));
    }
    content
}

pub mod recording_merge;
pub mod transcoder;

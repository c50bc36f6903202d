pub mod job;
pub mod recording;
pub mod transcode;

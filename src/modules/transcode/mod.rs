pub mod events;
pub mod ladder;
pub mod playlist;
pub mod service;

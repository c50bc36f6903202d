pub mod concat;
pub mod events;
pub mod model;
pub mod service;

pub mod dto;
pub mod handlers;
pub mod models;
pub mod service;

pub use handlers::video_config;
pub use service::VideoService;

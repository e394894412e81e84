pub mod health;
pub mod state;
pub mod validation;
pub mod video;

use actix_web::web::ServiceConfig;

/// Register every HTTP route. Shared data is attached by the caller.
pub fn routes(config: &mut ServiceConfig) {
    config
        .configure(state::state_config)
        .configure(health::health_config)
        .configure(video::video_config);
}

use crate::{
    api::{attendance, qr},
    auth::middleware::auth_middleware,
    config::Config,
    error::AppError,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// Malformed bodies answer with the same JSON shape as every other error.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(16 * 1024)
        .error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let requests_per_min = requests_per_min.max(1);
        let per_ms = (60_000 / requests_per_min as u64).max(1);
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap_or_else(GovernorConfig::default);
        Governor::new(&cfg)
    }

    let checkin_limiter = Arc::new(build_limiter(config.rate_checkin_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));
    let prefix = config.api_prefix.trim_end_matches('/');

    cfg.app_data(json_config());

    // Public route: scanners carry no bearer token.
    // Registered ahead of the protected scope so the scope never claims it.
    cfg.service(
        web::resource(format!("{}/attendance/checkin", prefix))
            .wrap(checkin_limiter)
            .route(web::post().to(attendance::check_in)),
    );

    // Protected routes
    cfg.service(
        web::scope(prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/qr")
                    // /qr/generate
                    .service(web::resource("/generate").route(web::post().to(qr::generate)))
                    // /qr/current
                    .service(web::resource("/current").route(web::get().to(qr::current)))
                    // /qr/revoke
                    .service(web::resource("/revoke").route(web::post().to(qr::revoke))),
            )
            .service(
                web::scope("/attendance")
                    // /attendance
                    .service(web::resource("").route(web::get().to(attendance::list_attendance)))
                    // /attendance/checkout
                    .service(
                        web::resource("/checkout").route(web::post().to(attendance::check_out)),
                    )
                    // /attendance/break
                    .service(
                        web::resource("/break").route(web::post().to(attendance::toggle_break)),
                    )
                    // /attendance/override
                    .service(
                        web::resource("/override")
                            .route(web::post().to(attendance::override_record)),
                    ),
            ),
    );
}

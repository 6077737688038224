//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use sahay_common::errors::AppError;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Limiter plus the configured rate, for error reporting
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<GlobalRateLimiter>,
    requests_per_second: u32,
}

/// Create a new rate limiter; zero values fall back to one
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> RateLimitState {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);
    let quota = Quota::per_second(rate).allow_burst(burst);

    RateLimitState {
        limiter: Arc::new(RateLimiter::direct(quota)),
        requests_per_second: rate.get(),
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limit): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match limit.limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::RateLimited {
                limit: limit.requests_per_second,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limit = create_rate_limiter(100, 200);
        assert!(limit.limiter.check().is_ok());
    }

    #[test]
    fn test_burst_exhaustion() {
        let limit = create_rate_limiter(1, 2);
        assert!(limit.limiter.check().is_ok());
        assert!(limit.limiter.check().is_ok());
        assert!(limit.limiter.check().is_err());
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let limit = create_rate_limiter(0, 0);
        assert_eq!(limit.requests_per_second, 1);
        assert!(limit.limiter.check().is_ok());
    }
}

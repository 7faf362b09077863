use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};

use super::AppState;
use crate::error::{AppError, Result};

/// Per-client-IP request budget, replenished continuously over a minute.
#[derive(Clone)]
pub struct IpRateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
}

impl IpRateLimiter {
    pub fn per_minute(max: u32) -> Result<Self> {
        let max = NonZeroU32::new(max)
            .ok_or_else(|| AppError::Config("RATE_LIMIT_PER_MINUTE must be greater than zero".to_string()))?;
        Ok(Self { limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(max))) })
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Forget clients whose budget is full again.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}

/// Requests without a peer address (no connect info) share one bucket.
fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| addr.ip())
}

pub async fn limit_by_ip(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let ip = client_ip(&req);
    if !state.rate_limiter.check(ip) {
        tracing::warn!("Rate limit exceeded for {}", ip);
        return AppError::TooManyRequests.into_response();
    }
    next.run(req).await
}

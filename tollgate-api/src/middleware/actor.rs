/// Actor resolution middleware
///
/// Resolves the caller of every `/v1` request and stores a
/// [`RequestContext`] in the request extensions:
///
/// 1. `Authorization: Bearer <key_id>:<secret>` resolves an API key actor
/// 2. otherwise the `session` cookie (HS256 JWT) resolves a user actor
/// 3. neither present: 401 `unauthorized`
///
/// Failed resolutions count against the `login` limit for the source IP;
/// once it is exhausted, further attempts from that IP get 429 before any
/// credential is checked. Nothing here is audited since no account is known.
///
/// The source IP is the connected peer. `X-Forwarded-For` is only read when
/// the peer is a configured trusted proxy, and then the right-most hop that
/// is not itself a trusted proxy wins; hops further left are client-supplied.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tollgate_shared::auth::actor::{Actor, RequestContext};
use tollgate_shared::auth::session::{self, SessionError};
use tollgate_shared::gate::LOGIN_ACTION;
use tracing::debug;

use crate::app::AppState;
use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "session";

/// Presented credential, before verification
#[derive(Debug, PartialEq, Eq)]
enum Credential<'a> {
    ApiKey(&'a str),
    Session(&'a str),
}

/// Middleware entry point; see the module docs
pub async fn resolve_actor(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let source_ip = source_ip(&req, &state.config.api.trusted_proxies);

    let credential = extract_credential(req.headers())
        .ok_or_else(|| ApiError::Unauthorized("Missing credentials".to_string()))?;

    if let Some(ip) = &source_ip {
        let remaining = state
            .gate
            .limiter()
            .remaining(LOGIN_ACTION, ip, state.gate.config().login_limit)
            .await
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        if remaining == 0 {
            return Err(ApiError::RateLimited);
        }
    }

    let resolved = match credential {
        Credential::ApiKey(presented) => state
            .gate
            .resolve_api_key(presented, source_ip.clone())
            .await
            .map_err(ApiError::from),
        Credential::Session(token) => resolve_session(&state, token, source_ip.clone()),
    };

    let ctx = match resolved {
        Ok(ctx) => ctx,
        Err(err) => {
            if let Some(ip) = &source_ip {
                state.gate.check_login_attempt(ip).await?;
            }
            return Err(err);
        }
    };

    debug!(account_id = %ctx.account_id(), actor = %ctx.actor.identifier(), "Actor resolved");

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

fn resolve_session(
    state: &AppState,
    token: &str,
    source_ip: Option<String>,
) -> Result<RequestContext, ApiError> {
    let claims = session::validate_session_token(token, &state.config.session.secret).map_err(
        |e| match e {
            SessionError::Expired => ApiError::Unauthorized("Session expired".to_string()),
            _ => ApiError::Unauthorized("Invalid session".to_string()),
        },
    )?;

    Ok(RequestContext::new(
        Actor::user(claims.sub, claims.account_id),
        source_ip,
    ))
}

/// API key from the bearer header, else the session cookie
fn extract_credential(headers: &HeaderMap) -> Option<Credential<'_>> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(presented) = bearer {
        return Some(Credential::ApiKey(presented));
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| Credential::Session(value))
}

fn source_ip(req: &Request, trusted_proxies: &[IpAddr]) -> Option<String> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())?;

    Some(client_ip(peer, req.headers(), trusted_proxies).to_string())
}

/// Right-most untrusted `X-Forwarded-For` hop when the peer is a trusted proxy, else the peer
fn client_ip(peer: IpAddr, headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> IpAddr {
    if !trusted_proxies.contains(&peer) {
        return peer;
    }

    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .collect();

    for hop in hops.into_iter().rev() {
        match hop.parse::<IpAddr>() {
            Ok(ip) if trusted_proxies.contains(&ip) => continue,
            Ok(ip) => return ip,
            // Anything left of a malformed hop cannot be attributed
            Err(_) => break,
        }
    }
    peer
}

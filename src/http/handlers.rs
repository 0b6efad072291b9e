//! Route handlers
//!
//! Tokens travel in HTTP-only cookies; bodies are camelCase JSON. Handlers only
//! translate between HTTP and the escalation and ballot services.

use crate::app::AppContext;
use crate::auth::{FaceLoginOutcome, FaceVoteOutcome, LoginOutcome, OtpStep};
use crate::biometric::{CaptureSignals, FaceCapture, MatchReport, ProbeSample};
use crate::crypto::{IssuedToken, Purpose, SelectionTarget};
use crate::http::cookies::{self, read_cookie, request_is_secure};
use crate::http::extract::ApiJson;
use crate::types::{ClientContext, ElectionId, Role, Selections};
use crate::{Error, Result};
use axum::Json;
use axum::extract::State;
use axum::http::header::{SET_COOKIE, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

type Reply = (StatusCode, HeaderMap, Json<Value>);

/// Cookie changes collected while handling one request
struct CookieJar {
    secure: bool,
    headers: HeaderMap,
}

impl CookieJar {
    fn for_request(headers: &HeaderMap, uri: &Uri) -> Self {
        Self {
            secure: request_is_secure(headers, uri.scheme_str()),
            headers: HeaderMap::new(),
        }
    }

    fn set(&mut self, issued: &IssuedToken) -> Result<()> {
        let value = cookies::set_cookie(
            issued.purpose,
            &issued.token,
            issued.lifetime_seconds,
            self.secure,
        );
        self.append(value)
    }

    fn clear(&mut self, purpose: Purpose) -> Result<()> {
        self.append(cookies::clear_cookie(purpose, self.secure))
    }

    fn clear_all(&mut self) -> Result<()> {
        for value in cookies::clear_all(self.secure) {
            self.append(value)?;
        }
        Ok(())
    }

    fn append(&mut self, value: String) -> Result<()> {
        let value = HeaderValue::from_str(&value)
            .map_err(|_| Error::internal("Cookie value is not a valid header"))?;
        self.headers.append(SET_COOKIE, value);
        Ok(())
    }

    fn reply(self, status: StatusCode, body: Value) -> Reply {
        (status, self.headers, Json(body))
    }
}

fn required_cookie(headers: &HeaderMap, name: &str) -> Result<String> {
    read_cookie(headers, name).ok_or_else(|| Error::unauthenticated("Missing credentials"))
}

fn client_context(headers: &HeaderMap) -> ClientContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    ClientContext {
        client_ip: header("x-forwarded-for")
            .and_then(|value| value.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header("x-real-ip")),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

fn match_body(report: &MatchReport) -> Value {
    json!({
        "match": report.matched,
        "best": report.best,
        "median": report.median,
        "mean": report.mean,
        "threshold": report.threshold,
        "compared": report.compared,
    })
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

pub async fn login(
    State(app): State<Arc<AppContext>>,
    headers: HeaderMap,
    uri: Uri,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Reply> {
    let mut jar = CookieJar::for_request(&headers, &uri);

    match app
        .escalation
        .login(&request.identifier, &request.password)
        .await?
    {
        LoginOutcome::Session { role, session, .. } => {
            jar.set(&session)?;
            Ok(jar.reply(
                StatusCode::OK,
                json!({ "otpRequired": false, "hasFace": false, "role": role }),
            ))
        }
        LoginOutcome::OtpRequired {
            role,
            pending,
            has_face,
            ..
        } => {
            jar.set(&pending)?;
            Ok(jar.reply(
                StatusCode::OK,
                json!({ "otpRequired": true, "hasFace": has_face, "role": role }),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub code: String,
}

pub async fn verify_otp(
    State(app): State<Arc<AppContext>>,
    headers: HeaderMap,
    uri: Uri,
    ApiJson(request): ApiJson<OtpRequest>,
) -> Result<Reply> {
    let pending = required_cookie(&headers, cookies::PENDING_COOKIE)?;
    let mut jar = CookieJar::for_request(&headers, &uri);

    match app.escalation.verify_otp(&pending, &request.code).await? {
        OtpStep::Verified { selection, target } => {
            jar.clear(Purpose::PendingCredential)?;
            jar.set(&selection)?;
            let next = match target {
                SelectionTarget::AdminSession => "admin_session",
                SelectionTarget::VoterPreAuth => "voter_pre_auth",
            };
            Ok(jar.reply(StatusCode::OK, json!({ "verified": true, "next": next })))
        }
        OtpStep::Retry => Ok(jar.reply(
            StatusCode::UNAUTHORIZED,
            json!({ "error": "otp_retry", "message": "Incorrect code, try again" }),
        )),
        OtpStep::Expired => {
            jar.clear(Purpose::PendingCredential)?;
            Ok(jar.reply(
                StatusCode::UNAUTHORIZED,
                json!({ "error": "otp_expired", "message": "Code expired, sign in again" }),
            ))
        }
    }
}

pub async fn admin_session(
    State(app): State<Arc<AppContext>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Reply> {
    let selection = required_cookie(&headers, cookies::SELECTION_COOKIE)?;
    let session = app.escalation.escalate_to_admin_session(&selection).await?;

    let mut jar = CookieJar::for_request(&headers, &uri);
    jar.clear(Purpose::SelectionVerified)?;
    jar.set(&session)?;
    Ok(jar.reply(StatusCode::OK, json!({ "ok": true, "role": Role::Admin })))
}

pub async fn voter_pre_auth(
    State(app): State<Arc<AppContext>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Reply> {
    let selection = required_cookie(&headers, cookies::SELECTION_COOKIE)?;
    let grant = app.escalation.escalate_to_voter_pre_auth(&selection).await?;

    let mut jar = CookieJar::for_request(&headers, &uri);
    jar.clear(Purpose::SelectionVerified)?;
    jar.set(&grant.pre_auth)?;
    Ok(jar.reply(StatusCode::OK, json!({ "ok": true, "hasFace": grant.has_face })))
}

/// Capture payload shared by enrollment and verification
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceRequest {
    pub embedding: Option<Vec<f32>>,
    pub embeddings: Option<Vec<Vec<f32>>>,
    pub yaws: Option<Vec<f32>>,
    pub liveness: Option<CaptureSignals>,
    #[serde(default)]
    pub for_voting: bool,
    pub election_id: Option<ElectionId>,
}

impl FaceRequest {
    fn into_capture(self) -> Result<FaceCapture> {
        let embeddings = match (self.embeddings, self.embedding) {
            (Some(many), _) if !many.is_empty() => many,
            (_, Some(one)) => vec![one],
            _ => return Err(Error::invalid_input("embedding or embeddings is required")),
        };

        let yaws: Vec<Option<f32>> = match self.yaws {
            Some(yaws) if yaws.len() == embeddings.len() => yaws.into_iter().map(Some).collect(),
            Some(_) => {
                return Err(Error::invalid_input(
                    "yaws must have one entry per embedding",
                ));
            }
            None => vec![None; embeddings.len()],
        };

        Ok(FaceCapture {
            samples: embeddings
                .into_iter()
                .zip(yaws)
                .map(|(embedding, yaw)| ProbeSample { embedding, yaw })
                .collect(),
            signals: self.liveness,
        })
    }
}

pub async fn enroll_face(
    State(app): State<Arc<AppContext>>,
    headers: HeaderMap,
    uri: Uri,
    ApiJson(request): ApiJson<FaceRequest>,
) -> Result<Reply> {
    let pre_auth = required_cookie(&headers, cookies::PRE_AUTH_COOKIE)?;
    let grant = app
        .escalation
        .enroll_face(&pre_auth, request.into_capture()?, &client_context(&headers))
        .await?;

    let mut jar = CookieJar::for_request(&headers, &uri);
    jar.clear(Purpose::VoterPreAuth)?;
    jar.set(&grant.session)?;
    Ok(jar.reply(
        StatusCode::OK,
        json!({
            "enrolled": true,
            "samplesStored": grant.outcome.samples_stored,
        }),
    ))
}

pub async fn verify_face(
    State(app): State<Arc<AppContext>>,
    headers: HeaderMap,
    uri: Uri,
    ApiJson(request): ApiJson<FaceRequest>,
) -> Result<Reply> {
    let client = client_context(&headers);
    let mut jar = CookieJar::for_request(&headers, &uri);

    if request.for_voting {
        let session = required_cookie(&headers, cookies::SESSION_COOKIE)?;
        let election_id = request
            .election_id
            .ok_or_else(|| Error::invalid_input("electionId is required when voting"))?;

        return match app
            .escalation
            .verify_face_for_voting(&session, election_id, request.into_capture()?, &client)
            .await?
        {
            FaceVoteOutcome::Authorized { ballot, report } => {
                jar.set(&ballot)?;
                let mut body = match_body(&report);
                body["ballotToken"] = json!(ballot.token);
                body["expiresAt"] = json!(ballot.expires_at);
                Ok(jar.reply(StatusCode::OK, body))
            }
            FaceVoteOutcome::NoMatch { report } => Ok(jar.reply(StatusCode::OK, match_body(&report))),
        };
    }

    let pre_auth = required_cookie(&headers, cookies::PRE_AUTH_COOKIE)?;
    match app
        .escalation
        .verify_face_for_login(&pre_auth, request.into_capture()?, &client)
        .await?
    {
        FaceLoginOutcome::Matched { session, report } => {
            jar.clear(Purpose::VoterPreAuth)?;
            jar.set(&session)?;
            Ok(jar.reply(StatusCode::OK, match_body(&report)))
        }
        FaceLoginOutcome::NoMatch { report } => Ok(jar.reply(StatusCode::OK, match_body(&report))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastRequest {
    pub selections: Selections,
    pub ballot_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CastResponse {
    ok: bool,
    #[serde(flatten)]
    receipt: crate::ballot::CastReceipt,
}

pub async fn cast_ballot(
    State(app): State<Arc<AppContext>>,
    headers: HeaderMap,
    uri: Uri,
    ApiJson(request): ApiJson<CastRequest>,
) -> Result<Reply> {
    let token = match request.ballot_token.filter(|token| !token.is_empty()) {
        Some(token) => token,
        None => required_cookie(&headers, cookies::BALLOT_COOKIE)?,
    };

    let receipt = app.ballots.cast(&token, &request.selections).await?;

    let mut jar = CookieJar::for_request(&headers, &uri);
    jar.clear(Purpose::BallotCast)?;
    let body = serde_json::to_value(CastResponse { ok: true, receipt })?;
    Ok(jar.reply(StatusCode::OK, body))
}

pub async fn logout(
    State(app): State<Arc<AppContext>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Reply> {
    app.escalation
        .logout(read_cookie(&headers, cookies::SESSION_COOKIE).as_deref());

    let mut jar = CookieJar::for_request(&headers, &uri);
    jar.clear_all()?;
    Ok(jar.reply(StatusCode::OK, json!({ "ok": true })))
}

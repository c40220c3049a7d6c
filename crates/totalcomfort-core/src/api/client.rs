//! Client for the Total Connect Comfort web portal.
//!
//! This module provides the `PortalClient` struct for authenticating
//! against the portal's login form and issuing the JSON requests that read
//! and write thermostat state.
//!
//! The portal scopes everything to a cookie session. Expiry is signalled
//! per request (an auth-error status, or a redirect back to the login
//! page); when that happens the client re-authenticates once and replays
//! the failed request before surfacing `SessionExpired`.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{Credentials, Session};
use crate::models::{
    Attribute, AttributeValue, AttributeWrite, Device, FanMode, Hold, Location, SystemMode,
};

use super::PortalError;

// ============================================================================
// Constants
// ============================================================================

/// The vendor's portal host. Endpoint shapes under it are an external,
/// versioned contract.
pub const PORTAL_DOMAIN: &str = "www.mytotalconnectcomfort.com";

/// Name of the session cookie the portal grants on login. A login response
/// that sets it to an empty value is a rejected login, whatever the status
/// code says.
const AUTH_COOKIE: &str = ".ASPXAUTH_TRUEHOME";

/// HTTP request timeout in seconds.
/// 30s allows for the portal's slow responses while failing fast enough
/// for interactive use.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Consecutive failed logins tolerated before the client imposes a
/// cooldown. The portal starts serving null cookies well before it ever
/// returns a 429.
const MAX_LOGIN_ATTEMPTS: u32 = 3;

/// Login cooldown in minutes once `MAX_LOGIN_ATTEMPTS` is reached.
const LOGIN_COOLDOWN_MINUTES: i64 = 10;

/// The location list is paginated; accounts never exceed this many pages.
const LOCATION_PAGE_COUNT: u32 = 4;

/// Seed for the cache-busting `_` query counter on device state requests.
const POLL_COUNTER_SEED: u64 = 1_700_000_000_000;

// ============================================================================
// Wire types (internal - domain types live in models)
// ============================================================================

#[derive(Serialize)]
struct LoginForm<'a> {
    #[serde(rename = "timeOffset")]
    time_offset: &'static str,
    #[serde(rename = "UserName")]
    username: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
    #[serde(rename = "RememberMe")]
    remember_me: &'static str,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    #[serde(rename = "LocationID")]
    location_id: i64,
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Devices", default)]
    devices: Vec<RawDevice>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    #[serde(rename = "DeviceID")]
    device_id: i64,
    #[serde(rename = "MacID", default)]
    mac_id: Option<String>,
    #[serde(rename = "Name", default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CheckDataResponse {
    success: bool,
    #[serde(rename = "deviceLive")]
    device_live: bool,
    #[serde(rename = "communicationLost")]
    communication_lost: bool,
    #[serde(rename = "latestData")]
    latest_data: crate::models::DeviceState,
}

/// Control-screen submission. The portal expects every key present, with
/// explicit nulls for the untouched ones.
#[derive(Debug, Default, Serialize)]
struct ControlChanges {
    #[serde(rename = "DeviceID")]
    device_id: i64,
    #[serde(rename = "SystemSwitch")]
    system_switch: Option<u8>,
    #[serde(rename = "HeatSetpoint")]
    heat_setpoint: Option<f64>,
    #[serde(rename = "CoolSetpoint")]
    cool_setpoint: Option<f64>,
    #[serde(rename = "HeatNextPeriod")]
    heat_next_period: Option<u16>,
    #[serde(rename = "CoolNextPeriod")]
    cool_next_period: Option<u16>,
    #[serde(rename = "StatusHeat")]
    status_heat: Option<u8>,
    #[serde(rename = "StatusCool")]
    status_cool: Option<u8>,
    #[serde(rename = "FanMode")]
    fan_mode: Option<u8>,
}

impl ControlChanges {
    fn for_device(device_id: i64) -> Self {
        Self {
            device_id,
            ..Self::default()
        }
    }
}

/// A replayable request description; the re-login retry path rebuilds the
/// request from this after re-authenticating.
struct PortalRequest {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl PortalRequest {
    fn get(url: String) -> Self {
        Self {
            method: Method::GET,
            url,
            query: Vec::new(),
            body: None,
        }
    }

    fn post(url: String) -> Self {
        Self {
            method: Method::POST,
            url,
            query: Vec::new(),
            body: None,
        }
    }

    fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client for the portal. Owns one cookie-scoped HTTP session; the caller
/// serializes operations (methods take `&mut self`, so concurrent calls
/// against one client do not compile).
pub struct PortalClient {
    http: Client,
    base_url: String,
    credentials: Credentials,
    null_cookie_count: u32,
    next_login: DateTime<Utc>,
    poll_counter: u64,
}

impl PortalClient {
    /// Create a client against the vendor's portal.
    pub fn new(credentials: Credentials) -> Result<Self, PortalError> {
        Self::with_base_url(credentials, format!("https://{PORTAL_DOMAIN}"))
    }

    /// Create a client against a different portal root. Tests point this at
    /// a local mock server.
    pub fn with_base_url(
        credentials: Credentials,
        base_url: impl Into<String>,
    ) -> Result<Self, PortalError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "X-Requested-With",
            header::HeaderValue::from_static("XMLHttpRequest"),
        );
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
        headers.insert(
            header::CONNECTION,
            header::HeaderValue::from_static("keep-alive"),
        );

        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .cookie_store(true)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            credentials,
            null_cookie_count: 0,
            next_login: Utc::now(),
            poll_counter: POLL_COUNTER_SEED,
        })
    }

    /// Submit the portal login form and confirm the auth cookie stuck.
    ///
    /// The portal answers the form POST with 200 even for bad credentials;
    /// only the follow-up GET (and the cookie it carries) tells the truth.
    pub async fn login(&mut self) -> Result<Session, PortalError> {
        if self.next_login > Utc::now() {
            return Err(PortalError::RateLimited(self.next_login));
        }

        let url = format!("{}/portal", self.base_url);
        let form = LoginForm {
            time_offset: "480",
            username: &self.credentials.username,
            password: &self.credentials.password,
            remember_me: "false",
        };

        let response = self.http.post(&url).form(&form).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.note_login_failure();
            return Err(PortalError::AuthError(format!(
                "login as {} rejected",
                self.credentials.username
            )));
        }
        if !status.is_success() {
            return Err(PortalError::ServiceUnavailable(status));
        }

        let verify = self.http.get(&url).send().await?;
        let status = verify.status();
        if verify
            .cookies()
            .any(|cookie| cookie.name() == AUTH_COOKIE && cookie.value().is_empty())
        {
            self.note_login_failure();
            return Err(PortalError::AuthError(
                "portal returned a null auth cookie".to_string(),
            ));
        }
        if status == StatusCode::UNAUTHORIZED {
            self.note_login_failure();
            return Err(PortalError::AuthError(format!(
                "login as {} unauthorized",
                self.credentials.username
            )));
        }
        if !status.is_success() {
            return Err(PortalError::ServiceUnavailable(status));
        }

        self.null_cookie_count = 0;
        debug!(username = %self.credentials.username, "logged in to portal");
        Ok(Session::new(Utc::now()))
    }

    /// End the session on the portal side. Consumes the session value.
    pub async fn logoff(&mut self, session: Session) -> Result<(), PortalError> {
        let url = format!("{}/portal/Account/LogOff", self.base_url);
        let response = self.http.post(&url).send().await?;
        debug!(status = %response.status(), "logged off");
        drop(session);
        Ok(())
    }

    /// Fetch the account's locations and hydrate every device's state.
    ///
    /// The discovered mapping is stored on the session and returned.
    pub async fn list_devices<'a>(
        &mut self,
        session: &'a mut Session,
    ) -> Result<&'a BTreeMap<i64, Location>, PortalError> {
        let url = format!("{}/portal/Location/GetLocationListData/", self.base_url);

        // The first page must parse; an expired session redirects it to the
        // login page and the re-login retry kicks in.
        let first = Self::location_page_request(&url, 1);
        let value = self.request_json(session, &first).await?;
        let mut raw_locations = parse_locations(value)?;

        for page in 2..=LOCATION_PAGE_COUNT {
            let request = Self::location_page_request(&url, page);
            match self.send_json(&request).await {
                Ok(value) => match parse_locations(value) {
                    Ok(more) if !more.is_empty() => raw_locations.extend(more),
                    _ => break,
                },
                // Past the last page the portal serves HTML, which surfaces
                // here as the expiry signal. Page one proved the session is
                // live, so it only means there are no more pages.
                Err(PortalError::SessionExpired) => break,
                Err(err) => return Err(err),
            }
        }

        let mut locations = BTreeMap::new();
        for raw in raw_locations {
            let mut location = Location {
                id: raw.location_id,
                name: raw.name,
                devices: BTreeMap::new(),
            };
            for raw_device in raw.devices {
                let mut device = Device {
                    id: raw_device.device_id,
                    mac_id: raw_device.mac_id,
                    name: raw_device.name,
                    location_id: raw.location_id,
                    ..Device::default()
                };
                let check = self.fetch_state(session, device.id).await?;
                device.device_live = check.device_live;
                device.communication_lost = check.communication_lost;
                device.state = check.latest_data;
                location.devices.insert(device.id, device);
            }
            locations.insert(location.id, location);
        }

        debug!(
            locations = locations.len(),
            devices = locations.values().map(Location::device_count).sum::<usize>(),
            "discovered devices"
        );
        session.set_locations(locations);
        Ok(session.locations())
    }

    fn location_page_request(url: &str, page: u32) -> PortalRequest {
        PortalRequest::post(url.to_string())
            .query("page", page.to_string())
            .query("filter", "")
    }

    /// Re-fetch one device's remote state.
    pub async fn refresh_device(
        &mut self,
        session: &mut Session,
        device: &mut Device,
    ) -> Result<(), PortalError> {
        let check = self.fetch_state(session, device.id).await?;
        device.device_live = check.device_live;
        device.communication_lost = check.communication_lost;
        device.state = check.latest_data;
        Ok(())
    }

    /// Read one attribute, refreshing the device first - attributes are
    /// remote state, fetched per call.
    pub async fn get_attribute(
        &mut self,
        session: &mut Session,
        device: &mut Device,
        attribute: Attribute,
    ) -> Result<AttributeValue, PortalError> {
        self.refresh_device(session, device).await?;
        device.attribute(attribute)
    }

    /// Write one attribute. The value is validated against the attribute's
    /// domain before any network traffic; domain violations fail locally
    /// with `InvalidValue`.
    pub async fn set_attribute(
        &mut self,
        session: &mut Session,
        device: &mut Device,
        write: AttributeWrite,
    ) -> Result<(), PortalError> {
        match write {
            AttributeWrite::Fan(mode) => self.set_fan_mode(session, device, mode).await,
            AttributeWrite::System(mode) => self.set_system_mode(session, device, mode).await,
            AttributeWrite::SetpointHeat(temp) => {
                self.set_setpoint_heat(session, device, temp).await
            }
            AttributeWrite::SetpointCool(temp) => {
                self.set_setpoint_cool(session, device, temp).await
            }
            AttributeWrite::Hold(hold) => self.set_hold(session, device, hold).await,
        }
    }

    pub async fn set_fan_mode(
        &mut self,
        session: &mut Session,
        device: &mut Device,
        mode: FanMode,
    ) -> Result<(), PortalError> {
        device.ensure_fan_mode_allowed(mode)?;
        let changes = ControlChanges {
            fan_mode: Some(mode.index()),
            ..ControlChanges::for_device(device.id)
        };
        self.submit(session, &changes).await?;
        device.state.fan.fan_mode = Some(mode.index());
        Ok(())
    }

    pub async fn set_system_mode(
        &mut self,
        session: &mut Session,
        device: &mut Device,
        mode: SystemMode,
    ) -> Result<(), PortalError> {
        device.ensure_system_mode_allowed(mode)?;
        let changes = ControlChanges {
            system_switch: Some(mode.index()),
            ..ControlChanges::for_device(device.id)
        };
        self.submit(session, &changes).await?;
        device.state.ui.system_switch_position = Some(mode.index());
        Ok(())
    }

    pub async fn set_setpoint_heat(
        &mut self,
        session: &mut Session,
        device: &mut Device,
        temp: f64,
    ) -> Result<(), PortalError> {
        let (heat, coupled_cool) = device.plan_setpoint_heat(temp)?;
        let changes = ControlChanges {
            heat_setpoint: Some(heat),
            cool_setpoint: coupled_cool,
            ..ControlChanges::for_device(device.id)
        };
        self.submit(session, &changes).await?;
        device.state.ui.heat_setpoint = Some(heat);
        if coupled_cool.is_some() {
            device.state.ui.cool_setpoint = coupled_cool;
        }
        Ok(())
    }

    pub async fn set_setpoint_cool(
        &mut self,
        session: &mut Session,
        device: &mut Device,
        temp: f64,
    ) -> Result<(), PortalError> {
        let (cool, coupled_heat) = device.plan_setpoint_cool(temp)?;
        let changes = ControlChanges {
            cool_setpoint: Some(cool),
            heat_setpoint: coupled_heat,
            ..ControlChanges::for_device(device.id)
        };
        self.submit(session, &changes).await?;
        device.state.ui.cool_setpoint = Some(cool);
        if coupled_heat.is_some() {
            device.state.ui.heat_setpoint = coupled_heat;
        }
        Ok(())
    }

    /// Apply a hold to both the heat and cool schedules.
    pub async fn set_hold(
        &mut self,
        session: &mut Session,
        device: &mut Device,
        hold: Hold,
    ) -> Result<(), PortalError> {
        let status = hold.status().index();
        let next_period = hold.next_period()?;
        let changes = ControlChanges {
            status_heat: Some(status),
            status_cool: Some(status),
            heat_next_period: next_period,
            cool_next_period: next_period,
            ..ControlChanges::for_device(device.id)
        };
        self.submit(session, &changes).await?;
        device.state.ui.status_heat = Some(status);
        device.state.ui.status_cool = Some(status);
        if next_period.is_some() {
            device.state.ui.heat_next_period = next_period;
            device.state.ui.cool_next_period = next_period;
        }
        Ok(())
    }

    // ===== Request plumbing =====

    async fn fetch_state(
        &mut self,
        session: &mut Session,
        device_id: i64,
    ) -> Result<CheckDataResponse, PortalError> {
        let url = format!("{}/portal/Device/CheckDataSession/{}", self.base_url, device_id);
        self.poll_counter += 1;
        let request = PortalRequest::get(url).query("_", self.poll_counter.to_string());
        let value = self.request_json(session, &request).await?;
        let check: CheckDataResponse = serde_json::from_value(value)
            .map_err(|err| PortalError::UnexpectedResponse(format!("malformed device data: {err}")))?;
        if !check.success {
            warn!(device_id, "portal reported failure querying device");
        }
        Ok(check)
    }

    async fn submit(
        &mut self,
        session: &mut Session,
        changes: &ControlChanges,
    ) -> Result<(), PortalError> {
        debug!(device_id = changes.device_id, "submitting control changes");
        let url = format!("{}/portal/Device/SubmitControlScreenChanges", self.base_url);
        let body = serde_json::to_value(changes)
            .map_err(|err| PortalError::UnexpectedResponse(err.to_string()))?;
        let request = PortalRequest::post(url).body(body);
        let value = self.request_json(session, &request).await?;
        if value.get("success").and_then(Value::as_i64) != Some(1) {
            return Err(PortalError::UnexpectedResponse(
                "portal rejected thermostat settings".to_string(),
            ));
        }
        Ok(())
    }

    /// Issue a JSON request with the session-expiry policy applied: on
    /// expiry, re-login once and replay the request once; every other
    /// failure propagates untouched.
    async fn request_json(
        &mut self,
        session: &mut Session,
        request: &PortalRequest,
    ) -> Result<Value, PortalError> {
        match self.send_json(request).await {
            Err(PortalError::SessionExpired) => {
                warn!(url = %request.url, "session expired, re-authenticating once");
                self.relogin(session).await?;
                self.send_json(request).await
            }
            other => other,
        }
    }

    async fn relogin(&mut self, session: &mut Session) -> Result<(), PortalError> {
        match self.login().await {
            Ok(fresh) => {
                session.renew(fresh.established_at());
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "re-login failed");
                Err(PortalError::SessionExpired)
            }
        }
    }

    async fn send_json(&mut self, request: &PortalRequest) -> Result<Value, PortalError> {
        let mut builder = self.http.request(request.method.clone(), &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            if !is_json(&response) {
                // A 200 that isn't JSON is the login page: the portal
                // redirects expired sessions there instead of failing.
                debug!(url = %request.url, "non-JSON response, treating session as expired");
                return Err(PortalError::SessionExpired);
            }
            self.null_cookie_count = 0;
            return response.json::<Value>().await.map_err(|err| {
                PortalError::UnexpectedResponse(format!("malformed JSON payload: {err}"))
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(PortalError::from_status(status, &body))
    }

    fn note_login_failure(&mut self) {
        self.null_cookie_count += 1;
        if self.null_cookie_count >= MAX_LOGIN_ATTEMPTS {
            self.next_login = Utc::now() + chrono::Duration::minutes(LOGIN_COOLDOWN_MINUTES);
            warn!(
                attempts = self.null_cookie_count,
                next_login = %self.next_login,
                "too many failed logins, imposing cooldown"
            );
        }
    }
}

fn is_json(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("application/json"))
        .unwrap_or(false)
}

fn parse_locations(value: Value) -> Result<Vec<RawLocation>, PortalError> {
    serde_json::from_value(value)
        .map_err(|err| PortalError::UnexpectedResponse(format!("malformed location list: {err}")))
}

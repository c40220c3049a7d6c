//! Integration tests for the portal client against a mock portal.
//!
//! These cover the login handshake, device discovery, attribute
//! reads/writes, and the one-shot re-authentication policy on session
//! expiry.

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use totalcomfort_core::models::Device;
use totalcomfort_core::{
    Attribute, AttributeWrite, Credentials, Hold, PortalClient, PortalError,
};

const DEVICE_ID: i64 = 1234567;

fn test_client(server: &MockServer) -> PortalClient {
    PortalClient::with_base_url(
        Credentials::new("user@example.com", "secret"),
        server.uri(),
    )
    .expect("client construction")
}

/// Login handshake: form POST grants the auth cookie, follow-up GET
/// confirms it.
async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/portal"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", ".ASPXAUTH_TRUEHOME=token123; Path=/")
                .set_body_string("<html>portal</html>"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>dashboard</html>"))
        .mount(server)
        .await;
}

fn location_list() -> Value {
    json!([{
        "LocationID": 42,
        "Name": "Home",
        "Devices": [
            {"DeviceID": DEVICE_ID, "MacID": "00D02DEADBEEF", "Name": "Downstairs"}
        ]
    }])
}

fn device_state(temperature: f64, heat_setpoint: f64) -> Value {
    json!({
        "success": true,
        "deviceLive": true,
        "communicationLost": false,
        "latestData": {
            "uiData": {
                "DispTemperature": temperature,
                "DisplayUnits": "F",
                "HeatSetpoint": heat_setpoint,
                "CoolSetpoint": 78.0,
                "HeatLowerSetptLimit": 40.0,
                "HeatUpperSetptLimit": 90.0,
                "CoolLowerSetptLimit": 50.0,
                "CoolUpperSetptLimit": 99.0,
                "Deadband": 0.0,
                "ScheduleHeatSp": heat_setpoint,
                "ScheduleCoolSp": 78.0,
                "SystemSwitchPosition": 1,
                "SwitchHeatAllowed": true,
                "SwitchOffAllowed": true,
                "SwitchCoolAllowed": true,
                "SwitchAutoAllowed": false,
                "SwitchEmergencyHeatAllowed": false,
                "StatusHeat": 0,
                "StatusCool": 0,
                "HeatNextPeriod": 34,
                "CoolNextPeriod": 34,
                "IndoorHumidity": 40.0,
                "IndoorHumiditySensorAvailable": true,
                "IndoorHumiditySensorNotFault": true,
                "OutdoorTemperatureAvailable": false,
                "OutdoorHumidityAvailable": false,
                "EquipmentOutputStatus": 0
            },
            "fanData": {
                "fanMode": 0,
                "fanModeAutoAllowed": true,
                "fanModeOnAllowed": true,
                "fanModeCirculateAllowed": true,
                "fanModeFollowScheduleAllowed": false,
                "fanIsRunning": false
            },
            "hasFan": true
        }
    })
}

/// Mount the device list endpoints: one JSON page, the rest served as the
/// HTML the real portal answers past the last page.
async fn mount_discovery(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/portal/Location/GetLocationListData/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(location_list()))
        .mount(server)
        .await;
    for page in ["2", "3", "4"] {
        Mock::given(method("POST"))
            .and(path("/portal/Location/GetLocationListData/"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>no more</html>"))
            .mount(server)
            .await;
    }
}

async fn mount_device_state(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/portal/Device/CheckDataSession/{DEVICE_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Login + discovery against a fully mocked portal, returning the session
/// and a caller-owned copy of the one device.
async fn logged_in_with_device(
    client: &mut PortalClient,
) -> (totalcomfort_core::Session, Device) {
    let mut session = client.login().await.expect("login");
    client.list_devices(&mut session).await.expect("discovery");
    let device = session
        .default_device()
        .cloned()
        .expect("account has a device");
    (session, device)
}

#[tokio::test]
async fn login_with_valid_credentials_succeeds() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let mut client = test_client(&server);
    let session = client.login().await.expect("login should succeed");
    assert_eq!(session.device_count(), 0);
}

#[tokio::test]
async fn login_with_rejected_credentials_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut client = test_client(&server);
    match client.login().await {
        Err(PortalError::AuthError(_)) => {}
        other => panic!("expected AuthError, got {other:?}"),
    }
}

#[tokio::test]
async fn login_with_null_auth_cookie_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>portal</html>"))
        .mount(&server)
        .await;
    // The portal signals a dead login by re-setting the auth cookie to an
    // empty value on the follow-up request.
    Mock::given(method("GET"))
        .and(path("/portal"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", ".ASPXAUTH_TRUEHOME=; Path=/")
                .set_body_string("<html>login</html>"),
        )
        .mount(&server)
        .await;

    let mut client = test_client(&server);
    match client.login().await {
        Err(PortalError::AuthError(_)) => {}
        other => panic!("expected AuthError, got {other:?}"),
    }
}

#[tokio::test]
async fn repeated_login_failures_trip_the_cooldown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(401))
        .expect(3)
        .mount(&server)
        .await;

    let mut client = test_client(&server);
    for _ in 0..3 {
        match client.login().await {
            Err(PortalError::AuthError(_)) => {}
            other => panic!("expected AuthError, got {other:?}"),
        }
    }
    // The fourth attempt never reaches the portal
    match client.login().await {
        Err(PortalError::RateLimited(_)) => {}
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn list_devices_returns_discovered_mapping() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_discovery(&server).await;
    mount_device_state(&server, device_state(58.0, 55.0)).await;

    let mut client = test_client(&server);
    let mut session = client.login().await.expect("login");
    let locations = client.list_devices(&mut session).await.expect("discovery");

    assert_eq!(locations.len(), 1);
    let location = &locations[&42];
    assert_eq!(location.display_name(), "Home");
    assert_eq!(location.device_count(), 1);

    let device = &location.devices[&DEVICE_ID];
    assert_eq!(device.display_name(), "Downstairs");
    assert_eq!(device.location_id, 42);
    assert!(device.is_alive());
    assert_eq!(device.current_temperature(), Some(58.0));
}

#[tokio::test]
async fn get_attribute_reads_fresh_remote_state() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_discovery(&server).await;
    mount_device_state(&server, device_state(58.0, 55.0)).await;

    let mut client = test_client(&server);
    let (mut session, mut device) = logged_in_with_device(&mut client).await;

    let value = client
        .get_attribute(&mut session, &mut device, Attribute::CurrentTemperature)
        .await
        .expect("get_attribute");
    assert_eq!(value.to_string(), "58.0");

    let value = client
        .get_attribute(&mut session, &mut device, Attribute::SystemMode)
        .await
        .expect("get_attribute");
    assert_eq!(value.to_string(), "heat");
}

#[tokio::test]
async fn set_then_get_returns_the_written_setpoint() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_discovery(&server).await;

    // Pre-write state feeds discovery; once the write lands, the portal
    // reports the new setpoint.
    Mock::given(method("GET"))
        .and(path(format!("/portal/Device/CheckDataSession/{DEVICE_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_state(58.0, 55.0)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_device_state(&server, device_state(58.0, 56.0)).await;

    Mock::given(method("POST"))
        .and(path("/portal/Device/SubmitControlScreenChanges"))
        .and(body_partial_json(json!({
            "DeviceID": DEVICE_ID,
            "HeatSetpoint": 56.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = test_client(&server);
    let (mut session, mut device) = logged_in_with_device(&mut client).await;
    assert_eq!(device.setpoint_heat(), Some(55.0));

    client
        .set_attribute(
            &mut session,
            &mut device,
            AttributeWrite::SetpointHeat(56.0),
        )
        .await
        .expect("set_attribute");
    // The local copy mirrors the accepted write immediately
    assert_eq!(device.setpoint_heat(), Some(56.0));

    let value = client
        .get_attribute(&mut session, &mut device, Attribute::SetpointHeat)
        .await
        .expect("get_attribute");
    assert_eq!(value.to_string(), "56.0");
}

#[tokio::test]
async fn out_of_range_setpoint_makes_no_network_call() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_discovery(&server).await;
    mount_device_state(&server, device_state(58.0, 55.0)).await;

    Mock::given(method("POST"))
        .and(path("/portal/Device/SubmitControlScreenChanges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let mut client = test_client(&server);
    let (mut session, mut device) = logged_in_with_device(&mut client).await;

    // Device advertises 40-90; both violations fail locally
    for temp in [12.0, 95.0] {
        match client
            .set_attribute(
                &mut session,
                &mut device,
                AttributeWrite::SetpointHeat(temp),
            )
            .await
        {
            Err(PortalError::InvalidValue(_)) => {}
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn hold_until_round_trips_through_the_portal_encoding() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_discovery(&server).await;
    mount_device_state(&server, device_state(58.0, 55.0)).await;

    Mock::given(method("POST"))
        .and(path("/portal/Device/SubmitControlScreenChanges"))
        .and(body_partial_json(json!({
            "DeviceID": DEVICE_ID,
            "StatusHeat": 1,
            "StatusCool": 1,
            "HeatNextPeriod": 54,
            "CoolNextPeriod": 54
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = test_client(&server);
    let (mut session, mut device) = logged_in_with_device(&mut client).await;

    let deadline = chrono::NaiveTime::from_hms_opt(13, 30, 0).unwrap();
    client
        .set_hold(&mut session, &mut device, Hold::Until(deadline))
        .await
        .expect("set_hold");

    // Local mirror reflects the hold without another fetch
    assert_eq!(device.hold_heat().unwrap(), Hold::Until(deadline));
    assert_eq!(
        device.attribute(Attribute::Hold).unwrap().to_string(),
        "heat:13:30 cool:13:30"
    );
}

#[tokio::test]
async fn off_boundary_hold_time_makes_no_network_call() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_discovery(&server).await;
    mount_device_state(&server, device_state(58.0, 55.0)).await;

    Mock::given(method("POST"))
        .and(path("/portal/Device/SubmitControlScreenChanges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let mut client = test_client(&server);
    let (mut session, mut device) = logged_in_with_device(&mut client).await;

    let deadline = chrono::NaiveTime::from_hms_opt(13, 20, 0).unwrap();
    match client
        .set_hold(&mut session, &mut device, Hold::Until(deadline))
        .await
    {
        Err(PortalError::InvalidValue(_)) => {}
        other => panic!("expected InvalidValue, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_submission_is_unexpected_response() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_discovery(&server).await;
    mount_device_state(&server, device_state(58.0, 55.0)).await;

    Mock::given(method("POST"))
        .and(path("/portal/Device/SubmitControlScreenChanges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 0})))
        .mount(&server)
        .await;

    let mut client = test_client(&server);
    let (mut session, mut device) = logged_in_with_device(&mut client).await;

    match client
        .set_attribute(
            &mut session,
            &mut device,
            AttributeWrite::SetpointHeat(56.0),
        )
        .await
    {
        Err(PortalError::UnexpectedResponse(_)) => {}
        other => panic!("expected UnexpectedResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_session_relogs_in_once_and_replays() {
    let server = MockServer::start().await;

    // Two logins total: the initial one and the transparent re-login.
    Mock::given(method("POST"))
        .and(path("/portal"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", ".ASPXAUTH_TRUEHOME=token123; Path=/")
                .set_body_string("<html>portal</html>"),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>dashboard</html>"))
        .expect(2)
        .mount(&server)
        .await;

    // First device-list request bounces with 401, the replay succeeds.
    Mock::given(method("POST"))
        .and(path("/portal/Location/GetLocationListData/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_discovery(&server).await;
    mount_device_state(&server, device_state(58.0, 55.0)).await;

    let mut client = test_client(&server);
    let mut session = client.login().await.expect("login");
    let first_epoch = session.established_at();

    let locations = client.list_devices(&mut session).await.expect("discovery");
    assert_eq!(locations.len(), 1);
    assert!(session.established_at() >= first_epoch);
}

#[tokio::test]
async fn failed_relogin_surfaces_session_expired() {
    let server = MockServer::start().await;

    // Initial login succeeds; the re-login attempt is rejected.
    Mock::given(method("POST"))
        .and(path("/portal"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", ".ASPXAUTH_TRUEHOME=token123; Path=/")
                .set_body_string("<html>portal</html>"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>dashboard</html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    // The portal keeps answering 401: the session is gone for good.
    Mock::given(method("POST"))
        .and(path("/portal/Location/GetLocationListData/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut client = test_client(&server);
    let mut session = client.login().await.expect("login");

    match client.list_devices(&mut session).await {
        Err(PortalError::SessionExpired) => {}
        other => panic!("expected SessionExpired, got {other:?}"),
    }
}

#[tokio::test]
async fn logoff_posts_to_the_portal() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/portal/Account/LogOff"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = test_client(&server);
    let session = client.login().await.expect("login");
    client.logoff(session).await.expect("logoff");
}

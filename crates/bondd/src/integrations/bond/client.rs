use std::time::Duration;

use async_trait::async_trait;
use reqwest::Response;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::BondError;
use crate::config::BondConfig;

/// Raw device state as reported by the hub, e.g. `{"power": 1, "speed": 3}`.
pub type DeviceState = serde_json::Map<String, serde_json::Value>;

/// Response of `GET /v2/sys/version`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Version {
    /// The hub's own identifier, e.g. `ZZBL12345`
    pub bondid: String,
    #[serde(default)]
    pub fw_ver: Option<String>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Response of `GET /v2/devices/{id}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceProperties {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// An action invocation, `PUT /v2/devices/{id}/actions/{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: &'static str,
    pub argument: Option<i64>,
}

impl Action {
    pub const TURN_ON: &'static str = "TurnOn";
    pub const TURN_OFF: &'static str = "TurnOff";
    pub const SET_SPEED: &'static str = "SetSpeed";
    pub const SET_DIRECTION: &'static str = "SetDirection";
    pub const TURN_LIGHT_ON: &'static str = "TurnLightOn";
    pub const TURN_LIGHT_OFF: &'static str = "TurnLightOff";
    pub const OPEN: &'static str = "Open";
    pub const CLOSE: &'static str = "Close";
    pub const HOLD: &'static str = "Hold";

    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            argument: None,
        }
    }

    pub fn with_argument(name: &'static str, argument: i64) -> Self {
        Self {
            name,
            argument: Some(argument),
        }
    }

    /// JSON body sent with the action request
    pub fn body(&self) -> serde_json::Value {
        match self.argument {
            Some(argument) => serde_json::json!({ "argument": argument }),
            None => serde_json::json!({}),
        }
    }
}

/// Trait for Bond local API operations
///
/// This trait allows for mocking the hub for testing purposes
#[async_trait]
pub trait BondApi: Send + Sync {
    /// Hub identity and firmware
    async fn version(&self) -> Result<Version, BondError>;

    /// Ids of every device known to the hub
    async fn devices(&self) -> Result<Vec<String>, BondError>;

    /// Static properties of one device
    async fn device(&self, device_id: &str) -> Result<DeviceProperties, BondError>;

    /// Current (assumed) state of one device
    async fn device_state(&self, device_id: &str) -> Result<DeviceState, BondError>;

    /// Execute an action on one device
    async fn action(&self, device_id: &str, action: &Action) -> Result<(), BondError>;
}

/// Real Bond client implementation using reqwest
pub struct ReqwestBondClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ReqwestBondClient {
    /// Create a new client from configuration
    pub fn new(config: &BondConfig) -> Result<Self, BondError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url(&config.host),
            token: config.token.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BondError> {
        debug!("GET {}", path);
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("BOND-Token", &self.token)
            .send()
            .await?;

        Ok(check_status(path, response)?.json().await?)
    }
}

fn base_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

fn check_status(path: &str, response: Response) -> Result<Response, BondError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BondError::Status {
            path: path.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Device ids are every key of the listing except the `_` hash entry.
fn device_ids(listing: serde_json::Map<String, serde_json::Value>) -> Vec<String> {
    listing
        .into_iter()
        .map(|(k, _)| k)
        .filter(|k| !k.starts_with('_'))
        .collect()
}

#[async_trait]
impl BondApi for ReqwestBondClient {
    async fn version(&self) -> Result<Version, BondError> {
        self.get_json("/v2/sys/version").await
    }

    async fn devices(&self) -> Result<Vec<String>, BondError> {
        let listing = self.get_json("/v2/devices").await?;
        Ok(device_ids(listing))
    }

    async fn device(&self, device_id: &str) -> Result<DeviceProperties, BondError> {
        self.get_json(&format!("/v2/devices/{}", device_id)).await
    }

    async fn device_state(&self, device_id: &str) -> Result<DeviceState, BondError> {
        self.get_json(&format!("/v2/devices/{}/state", device_id))
            .await
    }

    async fn action(&self, device_id: &str, action: &Action) -> Result<(), BondError> {
        let path = format!("/v2/devices/{}/actions/{}", device_id, action.name);
        debug!("PUT {} {}", path, action.body());
        let response = self
            .http
            .put(format!("{}{}", self.base_url, path))
            .header("BOND-Token", &self.token)
            .json(&action.body())
            .send()
            .await?;

        check_status(&path, response)?;
        Ok(())
    }
}

/// Mock Bond hub for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockBondClient {
    pub version: Option<Version>,
    pub devices: std::collections::BTreeMap<String, DeviceProperties>,
    pub states: std::sync::Mutex<std::collections::HashMap<String, DeviceState>>,
    pub state_calls: std::sync::Mutex<Vec<String>>,
    pub actions: std::sync::Mutex<Vec<(String, Action)>>,
    pub fail_state: std::sync::atomic::AtomicBool,
    pub fail_version: std::sync::atomic::AtomicBool,
    pub version_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockBondClient {
    /// Create a new mock hub with the given bond id
    pub fn new(bond_id: &str) -> Self {
        Self {
            version: Some(Version {
                bondid: bond_id.to_string(),
                fw_ver: Some("v2.10.8".to_string()),
                make: Some("Olibra".to_string()),
                model: Some("BD-1000".to_string()),
            }),
            ..Self::default()
        }
    }

    /// Add a device with its initial state
    pub fn with_device(
        mut self,
        device_id: &str,
        name: &str,
        device_type: &str,
        actions: &[&str],
        state: serde_json::Value,
    ) -> Self {
        self.devices.insert(
            device_id.to_string(),
            DeviceProperties {
                name: name.to_string(),
                device_type: device_type.to_string(),
                location: None,
                actions: actions.iter().map(|a| a.to_string()).collect(),
            },
        );
        self.set_state(device_id, state);
        self
    }

    pub fn set_state(&self, device_id: &str, state: serde_json::Value) {
        let state = match state {
            serde_json::Value::Object(map) => map,
            _ => DeviceState::new(),
        };
        self.states
            .lock()
            .unwrap()
            .insert(device_id.to_string(), state);
    }

    pub fn set_fail_state(&self, fail: bool) {
        self.fail_state
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Make `version` fail as if the hub were unreachable
    pub fn set_fail_version(&self, fail: bool) {
        self.fail_version
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn state_calls(&self) -> Vec<String> {
        self.state_calls.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<(String, Action)> {
        self.actions.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl BondApi for MockBondClient {
    async fn version(&self) -> Result<Version, BondError> {
        let fail = self.fail_version.load(std::sync::atomic::Ordering::SeqCst);
        self.version_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if fail {
            return Err(BondError::Status {
                path: "/v2/sys/version".to_string(),
                status: 503,
            });
        }
        self.version
            .clone()
            .ok_or_else(|| BondError::InvalidResponse("no version".to_string()))
    }

    async fn devices(&self) -> Result<Vec<String>, BondError> {
        Ok(self.devices.keys().cloned().collect())
    }

    async fn device(&self, device_id: &str) -> Result<DeviceProperties, BondError> {
        self.devices
            .get(device_id)
            .cloned()
            .ok_or_else(|| BondError::Status {
                path: format!("/v2/devices/{}", device_id),
                status: 404,
            })
    }

    async fn device_state(&self, device_id: &str) -> Result<DeviceState, BondError> {
        self.state_calls.lock().unwrap().push(device_id.to_string());
        if self.fail_state.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BondError::Status {
                path: format!("/v2/devices/{}/state", device_id),
                status: 503,
            });
        }
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(device_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn action(&self, device_id: &str, action: &Action) -> Result<(), BondError> {
        self.actions
            .lock()
            .unwrap()
            .push((device_id.to_string(), action.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("192.168.1.50"), "http://192.168.1.50");
        assert_eq!(base_url("bond.local:8080/"), "http://bond.local:8080");
        assert_eq!(base_url("https://bond.example"), "https://bond.example");
    }

    #[test]
    fn test_device_ids_skip_hash_entry() {
        let listing: serde_json::Map<String, serde_json::Value> = serde_json::from_str(
            r#"{"_": "7fc1e84b", "aabbccdd": {"_": "84cd8a43"}, "11223344": {"_": "02e9ad11"}}"#,
        )
        .unwrap();

        let mut ids = device_ids(listing);
        ids.sort();
        assert_eq!(ids, vec!["11223344".to_string(), "aabbccdd".to_string()]);
    }

    #[test]
    fn test_action_body() {
        assert_eq!(Action::new(Action::TURN_ON).body(), serde_json::json!({}));
        assert_eq!(
            Action::with_argument(Action::SET_SPEED, 3).body(),
            serde_json::json!({"argument": 3})
        );
    }

    #[test]
    fn test_parse_device_properties() {
        let props: DeviceProperties = serde_json::from_str(
            r#"{"name": "Living Room Fan", "type": "CF", "location": "Living Room",
                "actions": ["TurnOn", "TurnOff", "SetSpeed"], "_": "61a2e7f4"}"#,
        )
        .unwrap();

        assert_eq!(props.name, "Living Room Fan");
        assert_eq!(props.device_type, "CF");
        assert_eq!(props.location.as_deref(), Some("Living Room"));
        assert_eq!(props.actions.len(), 3);
    }

    #[test]
    fn test_parse_version() {
        let version: Version = serde_json::from_str(
            r#"{"target": "zermatt", "fw_ver": "v2.10.8", "bondid": "ZZBL12345",
                "make": "Olibra", "model": "BD-1000"}"#,
        )
        .unwrap();
        assert_eq!(version.bondid, "ZZBL12345");
        assert_eq!(version.fw_ver.as_deref(), Some("v2.10.8"));
    }

    #[test]
    fn test_new_client_from_config() {
        let config = BondConfig {
            host: "bond.local".to_string(),
            token: "secret".to_string(),
            poll_interval_secs: 10,
            request_timeout_secs: 5,
            connect_retry_secs: 30,
        };
        let client = ReqwestBondClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://bond.local");
        assert_eq!(client.token, "secret");
    }

    fn client_for(server: &mockito::Server) -> ReqwestBondClient {
        ReqwestBondClient::new(&BondConfig {
            host: server.url(),
            token: "secret".to_string(),
            poll_interval_secs: 10,
            request_timeout_secs: 5,
            connect_retry_secs: 30,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_version_over_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/sys/version")
            .match_header("BOND-Token", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"bondid": "ZZBL12345", "fw_ver": "v2.10.8", "make": "Olibra"}"#)
            .create_async()
            .await;

        let version = client_for(&server).version().await.unwrap();
        assert_eq!(version.bondid, "ZZBL12345");
        assert_eq!(version.make.as_deref(), Some("Olibra"));
        assert_eq!(version.model, None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_devices_and_properties_over_http() {
        let mut server = mockito::Server::new_async().await;
        let listing = server
            .mock("GET", "/v2/devices")
            .match_header("BOND-Token", "secret")
            .with_status(200)
            .with_body(r#"{"_": "7fc1e84b", "aabbccdd": {"_": "84cd8a43"}}"#)
            .create_async()
            .await;
        let props = server
            .mock("GET", "/v2/devices/aabbccdd")
            .match_header("BOND-Token", "secret")
            .with_status(200)
            .with_body(
                r#"{"name": "Bedroom Shade", "type": "MS", "location": "Bedroom",
                    "actions": ["Open", "Close", "Hold"]}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.devices().await.unwrap(), vec!["aabbccdd".to_string()]);

        let device = client.device("aabbccdd").await.unwrap();
        assert_eq!(device.name, "Bedroom Shade");
        assert_eq!(device.device_type, "MS");
        assert_eq!(device.location.as_deref(), Some("Bedroom"));

        listing.assert_async().await;
        props.assert_async().await;
    }

    #[tokio::test]
    async fn test_device_state_over_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/devices/aabbccdd/state")
            .match_header("BOND-Token", "secret")
            .with_status(200)
            .with_body(r#"{"power": 1, "speed": 3, "_": "ab12cd34"}"#)
            .create_async()
            .await;

        let state = client_for(&server).device_state("aabbccdd").await.unwrap();
        assert_eq!(state.get("power"), Some(&serde_json::json!(1)));
        assert_eq!(state.get("speed"), Some(&serde_json::json!(3)));
        assert_eq!(state.get("_"), Some(&serde_json::json!("ab12cd34")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_action_puts_argument_body() {
        let mut server = mockito::Server::new_async().await;
        let with_argument = server
            .mock("PUT", "/v2/devices/aabbccdd/actions/SetSpeed")
            .match_header("BOND-Token", "secret")
            .match_body(mockito::Matcher::Json(serde_json::json!({"argument": 3})))
            .with_status(204)
            .create_async()
            .await;
        let without_argument = server
            .mock("PUT", "/v2/devices/aabbccdd/actions/TurnOff")
            .match_header("BOND-Token", "secret")
            .match_body(mockito::Matcher::Json(serde_json::json!({})))
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server);
        client
            .action("aabbccdd", &Action::with_argument(Action::SET_SPEED, 3))
            .await
            .unwrap();
        client
            .action("aabbccdd", &Action::new(Action::TURN_OFF))
            .await
            .unwrap();

        with_argument.assert_async().await;
        without_argument.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_over_http() {
        let mut server = mockito::Server::new_async().await;
        let unauthorized = server
            .mock("GET", "/v2/devices/aabbccdd/state")
            .with_status(401)
            .with_body(r#"{"_error_id": 40, "_error_msg": "token invalid"}"#)
            .create_async()
            .await;
        let unavailable = server
            .mock("PUT", "/v2/devices/aabbccdd/actions/Open")
            .with_status(503)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.device_state("aabbccdd").await.unwrap_err();
        assert!(matches!(
            err,
            BondError::Status { ref path, status: 401 } if path == "/v2/devices/aabbccdd/state"
        ));

        let err = client
            .action("aabbccdd", &Action::new(Action::OPEN))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BondError::Status { ref path, status: 503 }
                if path == "/v2/devices/aabbccdd/actions/Open"
        ));

        unauthorized.assert_async().await;
        unavailable.assert_async().await;
    }

    #[tokio::test]
    async fn test_undecodable_body_is_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/sys/version")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client_for(&server).version().await.unwrap_err();
        assert!(matches!(err, BondError::Http(_)));
    }
}

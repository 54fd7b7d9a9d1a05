/// API path prefix
pub const API_PREFIX: &str = "/api";

/// Websocket endpoint for realtime pushes, relative to the API prefix
pub const EVENTS_PATH: &str = "/events";

/// Realtime event names
pub const EVENT_NEW_ENTRY: &str = "new_entry";
pub const EVENT_UPDATE_ENTRY: &str = "update_entry";

/// Recorded in place of an address when the lookup fails
pub const SENTINEL_IP: &str = "N/A";

/// Public address-lookup service, answers `{"ip": "..."}`
pub const DEFAULT_LOOKUP_URL: &str = "https://api.ipify.org?format=json";

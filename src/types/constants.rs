/// Command names understood by the bus (magic strings layer)
pub mod commands {
    pub const AUTHENTICATE: &str = "authenticate";
    pub const SET_PAGE: &str = "setpage";
    pub const SET_GROUPS: &str = "setgroups";
    pub const SET_PRESENCE: &str = "setpresence";
    pub const MESSAGE: &str = "message";
}

/// Field names used inside the `command` object and the poll query string
pub mod fields {
    pub const COMMAND: &str = "command";
    pub const USER: &str = "user";
    pub const USERS: &str = "users";
    pub const PAGE: &str = "page";
    pub const GROUPS: &str = "groups";
    pub const EVENT: &str = "event";
    pub const DATA: &str = "data";
    pub const TIME: &str = "time";
    pub const PRESENCE: &str = "presence";
}

/// Synthetic event fired once logical connectivity is first established
pub const CONNECT_EVENT: &str = "connect";

/// Duplex socket endpoint, relative to the bus address
pub const SOCKET_PATH: &str = "socket";

/// Long-poll endpoint, relative to the bus address
pub const LONGPOLL_PATH: &str = "lp";

/// Default cap on automatic retries, tracked per transport kind
pub const DEFAULT_MAX_RETRIES: u32 = 6;

/// Default fixed delay between retries (milliseconds)
pub const DEFAULT_RETRY_INTERVAL: u64 = 1000;

/// Default per-request timeout of a long-poll (milliseconds)
pub const DEFAULT_POLL_TIMEOUT: u64 = 90_000;

/// Buffer size of receivers handed out by `IncusClient::listen`
pub const LISTENER_BUFFER_SIZE: usize = 100;

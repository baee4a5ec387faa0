use crate::types::constants::{LONGPOLL_PATH, SOCKET_PATH, fields};
use crate::types::{IncusError, Result};
use url::Url;

/// Parameters of one long-poll request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollQuery {
    pub user: String,
    pub page: Option<String>,
    /// Encoded command frame to deliver with this request
    pub command: Option<String>,
}

impl PollQuery {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            page: None,
            command: None,
        }
    }

    /// Builds the request URL; absent or empty optional fields are omitted.
    pub fn to_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(fields::USER, &self.user);
            if let Some(page) = self.page.as_deref().filter(|p| !p.is_empty()) {
                pairs.append_pair(fields::PAGE, page);
            }
            if let Some(command) = self.command.as_deref() {
                pairs.append_pair(fields::COMMAND, command);
            }
        }
        url
    }
}

/// Derives the duplex socket endpoint (`ws(s)://.../socket`) from a bus address
pub fn socket_endpoint(address: &str) -> Result<Url> {
    endpoint(address, SOCKET_PATH, "wss", "ws")
}

/// Derives the long-poll endpoint (`http(s)://.../lp`) from a bus address
pub fn poll_endpoint(address: &str) -> Result<Url> {
    endpoint(address, LONGPOLL_PATH, "https", "http")
}

fn endpoint(address: &str, path: &str, secure_scheme: &str, plain_scheme: &str) -> Result<Url> {
    let mut url = Url::parse(address)?;

    let secure = match url.scheme() {
        "https" | "wss" => true,
        "http" | "ws" => false,
        other => {
            return Err(IncusError::InvalidAddress(format!(
                "unsupported scheme '{}' in {}",
                other, address
            )));
        }
    };

    let scheme = if secure { secure_scheme } else { plain_scheme };
    url.set_scheme(scheme)
        .map_err(|_| IncusError::InvalidAddress(format!("cannot use {} for {}", scheme, address)))?;

    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{}/{}", base, path));
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

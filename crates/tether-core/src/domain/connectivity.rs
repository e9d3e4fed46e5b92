//! Network reachability status

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Whether the server is currently reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityStatus {
    Online,
    Offline,
}

impl ConnectivityStatus {
    #[must_use]
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityStatus::Online)
    }
}

impl Display for ConnectivityStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityStatus::Online => f.write_str("online"),
            ConnectivityStatus::Offline => f.write_str("offline"),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a stored text value does not name a known variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} value: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// Closed enums persisted as TEXT columns. The serde name and the stored
// value are the same string so rows and wire payloads never disagree.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum! {
    /// Current health of a monitor. `Unknown` only until the first probe lands.
    pub enum MonitorStatus {
        Up => "up",
        Down => "down",
        Unknown => "unknown",
    }
}

impl Default for MonitorStatus {
    fn default() -> Self {
        MonitorStatus::Unknown
    }
}

text_enum! {
    /// Outcome of a single probe. A probe never yields `unknown`.
    pub enum ProbeStatus {
        Up => "up",
        Down => "down",
    }
}

impl From<ProbeStatus> for MonitorStatus {
    fn from(status: ProbeStatus) -> Self {
        match status {
            ProbeStatus::Up => MonitorStatus::Up,
            ProbeStatus::Down => MonitorStatus::Down,
        }
    }
}

text_enum! {
    pub enum ErrorKind {
        None => "none",
        Timeout => "timeout",
        Connection => "connection",
        Server => "server",
        Client => "client",
        Unknown => "unknown",
    }
}

text_enum! {
    pub enum AlertType {
        Downtime => "Downtime",
        HighLatency => "HighLatency",
        ErrorRate => "ErrorRate",
        SslIssue => "SSLIssue",
        Other => "Other",
    }
}

text_enum! {
    pub enum Severity {
        Critical => "Critical",
        High => "High",
        Medium => "Medium",
        Low => "Low",
        Info => "Info",
    }
}

text_enum! {
    pub enum HttpMethod {
        Get => "GET",
        Post => "POST",
        Put => "PUT",
        Delete => "DELETE",
        Patch => "PATCH",
        Head => "HEAD",
        Options => "OPTIONS",
    }
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Get
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

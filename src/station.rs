use serde::{Deserialize, Serialize};

/// A named internet radio source. Immutable once the station list is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub url: String,
}

impl Station {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

const BUILTIN: &[(&str, &str)] = &[
    ("Svensk Folk", "https://mediaserv38.live-streams.nl:8107/stream"),
    (
        "Radio Folk",
        "https://n12.radiojar.com/fqt2y0ds97zuv?rj-ttl=5&rj-tok=AAABjwesAq8A9PMhn7HQFNU3XA",
    ),
    ("Le Canard Folk", "https://dc1.serverse.com/proxy/wiupfvnu?mp=/TradCan"),
    ("Radio Siamsa", "https://cast02.siamsa.ie:8000/radio.mp3"),
];

/// The station list used when the config file doesn't provide one.
pub fn default_stations() -> Vec<Station> {
    BUILTIN
        .iter()
        .map(|(name, url)| Station::new(*name, *url))
        .collect()
}

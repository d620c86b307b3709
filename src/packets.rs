//! JSON bodies exchanged with the show server during discovery.

/// Broadcast by the show server when it comes up.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartupMessage {
    pub ip: String,
    pub mac: String,
    pub msg_type: String,
}

/// Our reply: where we listen and what hardware we drive.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPacket {
    pub name: String,
    pub ip: String,
    pub port: i64,
    pub mac: String,
    pub num_strips: i64,
    pub num_addrs: i64,
    pub strips: Vec<StripConfigPacket>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripConfigPacket {
    pub name: String,
    pub start_addr: i64,
    pub end_addr: i64,
    pub channel: i64,
}

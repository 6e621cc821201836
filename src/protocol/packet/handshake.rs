use minecraft_switch_proxy_macros::{Decode, Encode};

#[derive(Debug, Clone, Encode, Decode)]
pub struct Handshake {
    #[encoding(varint)]
    pub protocol_version: i32,
    /// A hostname plus room for the legacy Forge marker.
    #[encoding(max_length = 261)]
    pub server_address: String,
    pub port: u16,
    pub next_state: NextState,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Encode, Decode)]
#[encoding(discriminant = "varint")]
pub enum NextState {
    #[encoding(id = 1)]
    Status,
    #[encoding(id = 2)]
    Login,
}

impl Handshake {
    /// Whether the client announced itself as a legacy Forge client.
    pub fn is_legacy_forge(&self) -> bool {
        self.server_address.contains("\0FML\0")
    }

    /// The address the player typed, without trailing dots or
    /// mod markers.
    pub fn clean_address(&self) -> &str {
        let address = self
            .server_address
            .split('\0')
            .next()
            .unwrap_or_default();
        address.trim_end_matches('.')
    }
}

use minecraft_switch_proxy_macros::{Decode, Encode};

#[derive(Debug, Clone, Encode, Decode)]
pub struct StatusRequest;

#[derive(Debug, Clone, Encode, Decode)]
pub struct StatusResponse {
    #[encoding(max_length = 32767)]
    pub json: String,
}

#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct StatusPing {
    pub payload: i64,
}

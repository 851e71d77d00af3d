use serde::{Deserialize, Serialize};

/// One remote real-time feed. Immutable once registered with the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub address: String,
    /// Sent as a text frame right after the socket opens. Some exchanges
    /// stay silent until subscribed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<serde_json::Value>,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            subscribe: None,
        }
    }

    pub fn with_subscribe(mut self, payload: serde_json::Value) -> Self {
        self.subscribe = Some(payload);
        self
    }
}

/// The exchange feeds supervised when no configuration file says otherwise.
pub fn default_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::new("binance", "wss://stream.binance.com:9443/ws/btcusdt@ticker"),
        Endpoint::new("bybit", "wss://stream.bybit.com/v5/public/linear").with_subscribe(
            serde_json::json!({"op": "subscribe", "args": ["tickers.BTCUSDT"]}),
        ),
        Endpoint::new("okx", "wss://ws.okx.com:8443/ws/v5/public").with_subscribe(
            serde_json::json!({"op": "subscribe", "args": [{"channel": "tickers", "instId": "BTC-USDT"}]}),
        ),
        Endpoint::new("bingx", "wss://open-api-ws.bingx.com/market").with_subscribe(
            serde_json::json!({"id": "feedwatch-btc", "reqType": "sub", "dataType": "BTC-USDT@ticker"}),
        ),
    ]
}

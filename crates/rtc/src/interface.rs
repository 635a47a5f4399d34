//! Methodenaufruf-Fassade
//!
//! Nimmt benannte Aufrufe mit JSON-Parametern entgegen (z.B. aus einer
//! Bridge zu einer hoeheren Session-API) und leitet sie an den Client weiter.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mediaseal_core::{ConnectionRole, RoomId, SessionId};
use mediaseal_crypto::{Key, KeyType};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::client::WebRtcClient;
use crate::error::{RtcError, RtcResult};
use crate::platform::{SdpType, SessionDescription};

/// Namen aller unterstuetzten Methoden
pub const METHODS: [&str; 6] = [
    "createOfferAndSetLocalDescription",
    "createAnswerAndSetDescriptions",
    "setAnswerAndSetRemoteDescription",
    "updateSessionId",
    "close",
    "updateKeys",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomModel {
    room_id: RoomId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SdpWithRoomModel {
    room_id: RoomId,
    sdp: String,
    #[serde(rename = "type")]
    sdp_type: SdpType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSessionIdModel {
    room_id: RoomId,
    session_id: SessionId,
    connection_type: ConnectionRole,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyModel {
    key_id: String,
    /// Base64-kodiertes Schluesselmaterial
    key: String,
    #[serde(rename = "type")]
    key_type: KeyType,
}

#[derive(Debug, Deserialize)]
struct UpdateKeysModel {
    keys: Vec<KeyModel>,
}

pub struct WebRtcInterface {
    client: WebRtcClient,
}

impl WebRtcInterface {
    pub fn new(client: WebRtcClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &WebRtcClient {
        &self.client
    }

    /// Fuehrt die benannte Methode aus
    ///
    /// SDP-Ergebnisse kommen als JSON-String zurueck, alle anderen als `null`.
    pub async fn method_call(&self, name: &str, params: Value) -> RtcResult<Value> {
        tracing::debug!(methode = name, "Methodenaufruf");
        match name {
            "createOfferAndSetLocalDescription" => {
                let model: RoomModel = parse(params)?;
                let sdp = self
                    .client
                    .create_offer_and_set_local_description(&model.room_id)
                    .await?;
                Ok(Value::String(sdp))
            }
            "createAnswerAndSetDescriptions" => {
                let model: SdpWithRoomModel = parse(params)?;
                let offer = SessionDescription {
                    sdp_type: model.sdp_type,
                    sdp: model.sdp,
                };
                let answer = self
                    .client
                    .on_subscription_updated(&model.room_id, offer)
                    .await?;
                Ok(Value::String(answer.sdp))
            }
            "setAnswerAndSetRemoteDescription" => {
                let model: SdpWithRoomModel = parse(params)?;
                let answer = SessionDescription {
                    sdp_type: model.sdp_type,
                    sdp: model.sdp,
                };
                self.client
                    .set_answer_and_set_remote_description(&model.room_id, answer)
                    .await?;
                Ok(Value::Null)
            }
            "updateSessionId" => {
                let model: UpdateSessionIdModel = parse(params)?;
                self.client
                    .update_session_id(&model.room_id, model.connection_type, model.session_id);
                Ok(Value::Null)
            }
            "close" => {
                let model: RoomModel = parse(params)?;
                self.client.close(&model.room_id).await?;
                Ok(Value::Null)
            }
            "updateKeys" => {
                let model: UpdateKeysModel = parse(params)?;
                let keys = model
                    .keys
                    .into_iter()
                    .map(key_aus_model)
                    .collect::<RtcResult<Vec<_>>>()?;
                self.client.update_keys(keys).await?;
                Ok(Value::Null)
            }
            unbekannt => Err(RtcError::MethodNotImplemented(unbekannt.to_string())),
        }
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> RtcResult<T> {
    serde_json::from_value(params).map_err(|e| RtcError::InvalidParams(e.to_string()))
}

fn key_aus_model(model: KeyModel) -> RtcResult<Key> {
    let bytes = BASE64.decode(model.key.as_bytes()).map_err(|e| {
        RtcError::InvalidParams(format!("Schluessel '{}' kein Base64: {e}", model.key_id))
    })?;
    Ok(Key::new(model.key_id, bytes, model.key_type))
}

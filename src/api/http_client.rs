use crate::api::{
    ApiError, AttributeApi, AttributeWriteRequest, Attributes, CustomDataApi, OperatorChannel,
    ResourceScope,
};
use crate::shared::ReservationId;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Client for a remote reservation service exposing attributes, custom data
/// and the operator output stream over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct SandboxApiClient {
    api_base: String,
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    data: T,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct EmptyData {}

#[derive(Debug, Clone, Deserialize)]
struct AttributesData {
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Debug, Clone, Deserialize)]
struct DecryptData {
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CustomData {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct SetAttributesBody<'a> {
    attributes: &'a [AttributeWriteRequest],
}

impl SandboxApiClient {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            api_base: api_base.into(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn endpoint(&self, segments: &[&str]) -> String {
        let path = segments
            .iter()
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<Option<T>, ApiError> {
        match self.authorize(ureq::get(url)).call() {
            Ok(response) => response
                .into_json::<T>()
                .map(Some)
                .map_err(|e| ApiError::Request(e.to_string())),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(ApiError::Request(e.to_string())),
        }
    }

    fn send_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let payload = serde_json::to_value(body).map_err(|e| ApiError::Request(e.to_string()))?;
        let response = self
            .authorize(ureq::request(method, url))
            .send_json(payload)
            .map_err(|e| ApiError::Request(e.to_string()))?;
        response
            .into_json::<T>()
            .map_err(|e| ApiError::Request(e.to_string()))
    }
}

fn check<T>(envelope: Envelope<T>, operation: &str) -> Result<T, ApiError> {
    if envelope.ok {
        Ok(envelope.data)
    } else {
        Err(ApiError::Response(
            envelope
                .error
                .unwrap_or_else(|| format!("{operation} failed")),
        ))
    }
}

impl AttributeApi for SandboxApiClient {
    fn get_attributes(&self, scope: &ResourceScope) -> Result<Attributes, ApiError> {
        let url = self.endpoint(&[
            "reservations",
            scope.reservation_id.as_str(),
            "resources",
            &scope.resource_name,
            "attributes",
        ]);
        let envelope: Envelope<AttributesData> =
            self.get(&url)?.ok_or_else(|| ApiError::UnknownResource {
                reservation: scope.reservation_id.to_string(),
                resource: scope.resource_name.clone(),
            })?;
        Ok(check(envelope, "get attributes")?.attributes)
    }

    fn set_attributes(
        &self,
        scope: &ResourceScope,
        requests: &[AttributeWriteRequest],
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&[
            "reservations",
            scope.reservation_id.as_str(),
            "resources",
            &scope.resource_name,
            "attributes",
        ]);
        let envelope: Envelope<EmptyData> = self.send_json(
            "POST",
            &url,
            &SetAttributesBody {
                attributes: requests,
            },
        )?;
        check(envelope, "set attributes").map(|_| ())
    }

    fn decrypt_password(&self, value: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&["passwords", "decrypt"]);
        let envelope: Envelope<DecryptData> =
            self.send_json("POST", &url, &json!({ "value": value }))?;
        Ok(check(envelope, "decrypt password")?.value)
    }
}

impl CustomDataApi for SandboxApiClient {
    fn get_custom_data(&self, reservation: &ReservationId) -> Result<Option<String>, ApiError> {
        let url = self.endpoint(&["reservations", reservation.as_str(), "custom-data"]);
        let Some(envelope) = self.get::<Envelope<CustomData>>(&url)? else {
            return Ok(None);
        };
        Ok(check(envelope, "get custom data")?
            .data
            .filter(|blob| !blob.is_empty()))
    }

    fn set_custom_data(&self, reservation: &ReservationId, blob: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["reservations", reservation.as_str(), "custom-data"]);
        let envelope: Envelope<EmptyData> =
            self.send_json("PUT", &url, &json!({ "data": blob }))?;
        check(envelope, "set custom data").map(|_| ())
    }
}

impl OperatorChannel for SandboxApiClient {
    fn write_reservation_message(
        &self,
        reservation: &ReservationId,
        message: &str,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["reservations", reservation.as_str(), "output"]);
        let envelope: Envelope<EmptyData> =
            self.send_json("POST", &url, &json!({ "message": message }))?;
        check(envelope, "write reservation message").map(|_| ())
    }
}

//! RPC method router. Translates msgpack bodies to the internal model and back.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::batch::BatchRequest;
use crate::convert::ConversionRequest;
use crate::service::ConvertService;
use crate::types::{Error, Result};

/// Route an RPC request to the conversion service.
pub async fn route_request(service: &ConvertService, method: &str, body: Value) -> Result<Value> {
    match method {
        "Convert" => {
            let request: ConversionRequest = decode_body(body)?;
            encode_body(&service.convert(request).await?)
        }
        "ConvertBatch" => {
            let request: BatchRequest = decode_body(body)?;
            encode_body(&service.convert_batch(request).await?)
        }
        "HealthCheck" => encode_body(&service.health()),
        "GetConverterInfo" => encode_body(&service.info()),
        "ConvertFromURL" => {
            let url = body.get("url").and_then(Value::as_str).unwrap_or_default();
            encode_body(&service.convert_from_url(url).await?)
        }
        _ => Err(Error::not_found(format!("unknown method: {}", method))),
    }
}

fn decode_body<T: DeserializeOwned>(body: Value) -> Result<T> {
    let body = if body.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        body
    };
    Ok(serde_json::from_value(body)?)
}

fn encode_body<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

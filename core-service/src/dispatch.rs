//! # Method Dispatch
//!
//! Routes host method calls named `<namespace>.<action>` to the document
//! and key-value cores.
//!
//! | method | arguments | result |
//! |---|---|---|
//! | `kv.getString` | containerId, key | list of strings, or null |
//! | `kv.putString` | containerId, key, value | bool |
//! | `documents.upload` | containerId, localFilePath, cloudFilePath, eventChannelName | null |
//! | `documents.gather` | containerId, eventChannelName | list of records, or null when streaming |
//! | `documents.download` | containerId, cloudFilePath, localFilePath, eventChannelName | null |
//! | `documents.delete` | containerId, cloudFilePath | null |
//! | `documents.move` | containerId, fromCloudPathFile, toCloudPathFile | null |
//! | `documents.createEventChannel` | eventChannelName | null |
//!
//! `eventChannelName` is required; an empty name runs the operation without
//! streaming. A method name that is not exactly two
//! non-empty dot-separated parts, an unknown namespace or an unknown action
//! answers [`MethodResponse::NotImplemented`]. Arguments that are not a JSON
//! object, or a missing or mistyped argument, answer `E_ARG`.

use crate::CloudKitService;
use core_documents::DocumentError;
use core_runtime::events::ErrorPayload;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

/// One host call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// Answer to one host call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum MethodResponse {
    Success(Value),
    Error(ErrorPayload),
    NotImplemented,
}

impl MethodResponse {
    pub fn null() -> Self {
        MethodResponse::Success(Value::Null)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResponse::Success(_))
    }
}

impl From<DocumentError> for MethodResponse {
    fn from(error: DocumentError) -> Self {
        MethodResponse::Error(error.to_payload())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Documents,
    Kv,
}

/// Split `<namespace>.<action>`; `None` for anything else
fn parse_method(method: &str) -> Option<(&str, &str)> {
    let mut parts = method.split('.').filter(|part| !part.is_empty());
    let namespace = parts.next()?;
    let action = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((namespace, action))
}

fn invalid_arguments() -> MethodResponse {
    MethodResponse::Error(DocumentError::InvalidArgument(String::new()).to_payload())
}

/// Typed access to the argument map
struct Arguments<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Arguments<'a> {
    fn string(&self, name: &str) -> Result<&'a str, MethodResponse> {
        match self.map.get(name) {
            Some(Value::String(value)) => Ok(value.as_str()),
            _ => {
                debug!(argument = name, "Missing or mistyped argument");
                Err(invalid_arguments())
            }
        }
    }

    fn value(&self, name: &str) -> Result<Value, MethodResponse> {
        self.map.get(name).cloned().ok_or_else(|| {
            debug!(argument = name, "Missing argument");
            invalid_arguments()
        })
    }
}

impl CloudKitService {
    /// Route one host call
    #[instrument(skip_all, fields(method = %call.method))]
    pub async fn handle(&self, call: MethodCall) -> MethodResponse {
        let Some((namespace, action)) = parse_method(&call.method) else {
            return MethodResponse::NotImplemented;
        };

        let Value::Object(map) = &call.arguments else {
            return invalid_arguments();
        };
        let args = Arguments { map };

        let namespace = match namespace {
            "documents" => Namespace::Documents,
            "kv" => Namespace::Kv,
            _ => return MethodResponse::NotImplemented,
        };

        let response = match namespace {
            Namespace::Documents => self.handle_documents(action, &args).await,
            Namespace::Kv => self.handle_kv(action, &args).await,
        };
        response.unwrap_or_else(|response| response)
    }

    async fn handle_documents(
        &self,
        action: &str,
        args: &Arguments<'_>,
    ) -> Result<MethodResponse, MethodResponse> {
        let documents = self.documents();

        let outcome = match action {
            "createEventChannel" => {
                let name = args.string("eventChannelName")?;
                documents.create_event_channel(name).map(|_| Value::Null)
            }
            "upload" => {
                let container_id = args.string("containerId")?;
                let local = args.string("localFilePath")?;
                let cloud = args.string("cloudFilePath")?;
                let channel = args.string("eventChannelName")?;
                documents
                    .upload(container_id, local, cloud, channel)
                    .await
                    .map(|_| Value::Null)
            }
            "gather" => {
                let container_id = args.string("containerId")?;
                let channel = args.string("eventChannelName")?;
                match documents.gather(container_id, channel).await {
                    Ok(Some(records)) => serde_json::to_value(records)
                        .map_err(|e| DocumentError::NativeIo(e.to_string())),
                    Ok(None) => Ok(Value::Null),
                    Err(e) => Err(e),
                }
            }
            "download" => {
                let container_id = args.string("containerId")?;
                let cloud = args.string("cloudFilePath")?;
                let local = args.string("localFilePath")?;
                let channel = args.string("eventChannelName")?;
                documents
                    .download(container_id, cloud, local, channel)
                    .await
                    .map(|_| Value::Null)
            }
            "delete" => {
                let container_id = args.string("containerId")?;
                let cloud = args.string("cloudFilePath")?;
                documents
                    .delete(container_id, cloud)
                    .await
                    .map(|_| Value::Null)
            }
            "move" => {
                let container_id = args.string("containerId")?;
                let from = args.string("fromCloudPathFile")?;
                let to = args.string("toCloudPathFile")?;
                documents
                    .move_item(container_id, from, to)
                    .await
                    .map(|_| Value::Null)
            }
            _ => return Ok(MethodResponse::NotImplemented),
        };

        Ok(match outcome {
            Ok(value) => MethodResponse::Success(value),
            Err(e) => e.into(),
        })
    }

    async fn handle_kv(
        &self,
        action: &str,
        args: &Arguments<'_>,
    ) -> Result<MethodResponse, MethodResponse> {
        match action {
            "getString" => {
                let container_id = args.string("containerId")?;
                let key = args.string("key")?;
                let values = self.kv().get_string(container_id, key).await;
                Ok(MethodResponse::Success(
                    values.map_or(Value::Null, |values| values.into()),
                ))
            }
            "putString" => {
                let container_id = args.string("containerId")?;
                let key = args.string("key")?;
                let value = args.value("value")?;
                let saved = self.kv().put_string(container_id, key, value).await;
                Ok(MethodResponse::Success(Value::Bool(saved)))
            }
            _ => Ok(MethodResponse::NotImplemented),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("documents.upload"), Some(("documents", "upload")));
        assert_eq!(parse_method("kv.getString"), Some(("kv", "getString")));
        assert_eq!(parse_method("upload"), None);
        assert_eq!(parse_method("a.b.c"), None);
        assert_eq!(parse_method(""), None);
    }

    #[test]
    fn test_invalid_arguments_payload() {
        match invalid_arguments() {
            MethodResponse::Error(payload) => {
                assert_eq!(payload.code, "E_ARG");
                assert_eq!(payload.message, "Invalid Arguments");
                assert_eq!(payload.details, None);
            }
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[test]
    fn test_response_serialization() {
        let value = serde_json::to_value(MethodResponse::null()).unwrap();
        assert_eq!(value, serde_json::json!({"status": "success", "value": null}));

        let value = serde_json::to_value(MethodResponse::NotImplemented).unwrap();
        assert_eq!(value, serde_json::json!({"status": "notImplemented"}));
    }
}

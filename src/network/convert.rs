//! Conversions between gNMI wire messages and the server's own types.

use tonic::Status;

use crate::proto;
use crate::proto::subscribe_response;
use crate::proto::typed_value;
use crate::proto::Encoding;
use crate::server::Capabilities;
use crate::CloseReason;
use crate::Emission;
use crate::GetRequest;
use crate::PathResolver;
use crate::ResolveError;
use crate::ResolvedPath;
use crate::Result;
use crate::SessionError;
use crate::SessionEvent;
use crate::SubMode;
use crate::SubscribeMode;
use crate::SubscriptionEntry;
use crate::SubscriptionRequest;
use crate::TelemetryValue;
use crate::UpdateEvent;

/// Target and element names of `path` below `prefix`
fn split_path(
    prefix: Option<&proto::Path>,
    path: Option<&proto::Path>,
) -> Result<(String, Vec<String>)> {
    let mut elems = Vec::new();
    let mut target = String::new();

    for part in [prefix, path].into_iter().flatten() {
        if !part.target.is_empty() {
            target = part.target.clone();
        }
        for elem in &part.elem {
            if !elem.key.is_empty() {
                return Err(ResolveError::InvalidPath {
                    path: elem.name.clone(),
                    reason: "path element keys are not supported".into(),
                }
                .into());
            }
            elems.push(elem.name.clone());
        }
    }

    if target.is_empty() {
        return Err(ResolveError::InvalidTarget(String::new()).into());
    }
    Ok((target, elems))
}

async fn resolve(
    resolver: &PathResolver,
    prefix: Option<&proto::Path>,
    path: Option<&proto::Path>,
) -> Result<ResolvedPath> {
    let (target, elems) = split_path(prefix, path)?;
    resolver.resolve_elems(&target, elems).await
}

fn check_encoding(encoding: i32) -> Result<Encoding> {
    match Encoding::try_from(encoding) {
        Ok(e @ (Encoding::Json | Encoding::JsonIetf)) => Ok(e),
        _ => Err(SessionError::UnsupportedEncoding(encoding).into()),
    }
}

pub(crate) async fn get_request(
    resolver: &PathResolver,
    request: proto::GetRequest,
) -> Result<(GetRequest, Encoding)> {
    let encoding = check_encoding(request.encoding)?;
    if request.path.is_empty() {
        return Err(ResolveError::InvalidPath {
            path: String::new(),
            reason: "GET without paths".into(),
        }
        .into());
    }

    let mut paths = Vec::with_capacity(request.path.len());
    for path in &request.path {
        paths.push(resolve(resolver, request.prefix.as_ref(), Some(path)).await?);
    }
    Ok((GetRequest { paths }, encoding))
}

/// Validates a `SubscriptionList` and resolves all of its paths.
///
/// Sub-modes and intervals are checked before any store access. The returned
/// encoding applies to every notification of the session.
pub(crate) async fn subscription_request(
    resolver: &PathResolver,
    list: proto::SubscriptionList,
) -> Result<(SubscriptionRequest, Encoding)> {
    let encoding = check_encoding(list.encoding)?;
    let mode = SubscribeMode::from_wire(list.mode)?;

    let mut checked = Vec::with_capacity(list.subscription.len());
    for subscription in &list.subscription {
        let (_, elems) = split_path(list.prefix.as_ref(), subscription.path.as_ref())?;
        let sub_mode = SubMode::from_wire(subscription.mode, subscription.sample_interval, &elems.join("/"))?;
        checked.push((subscription, sub_mode));
    }

    let mut entries = Vec::with_capacity(checked.len());
    for (subscription, sub_mode) in checked {
        entries.push(SubscriptionEntry {
            path: resolve(resolver, list.prefix.as_ref(), subscription.path.as_ref()).await?,
            mode: sub_mode,
        });
    }

    Ok((SubscriptionRequest::new(mode, entries, list.update_count)?, encoding))
}

fn wire_path(
    target: &str,
    elems: &[String],
) -> proto::Path {
    proto::Path {
        origin: String::new(),
        elem: elems
            .iter()
            .map(|name| proto::PathElem {
                name: name.clone(),
                key: Default::default(),
            })
            .collect(),
        target: target.to_string(),
    }
}

fn typed_value(
    value: &TelemetryValue,
    encoding: Encoding,
) -> std::result::Result<proto::TypedValue, Status> {
    let value = match value {
        TelemetryValue::String(s) => typed_value::Value::StringVal(s.clone()),
        TelemetryValue::Json(_) => {
            let bytes = value
                .to_json_bytes()
                .map_err(|e| Status::internal(format!("failed to encode value: {}", e)))?;
            match encoding {
                Encoding::Json => typed_value::Value::JsonVal(bytes),
                _ => typed_value::Value::JsonIetfVal(bytes),
            }
        }
    };
    Ok(proto::TypedValue { value: Some(value) })
}

/// One notification; updates without a value become deletes
fn notification(
    timestamp: u64,
    updates: &[UpdateEvent],
    encoding: Encoding,
) -> std::result::Result<proto::Notification, Status> {
    let mut notification = proto::Notification {
        timestamp: i64::try_from(timestamp).unwrap_or(i64::MAX),
        prefix: updates.first().map(|u| wire_path(&u.target, &[])),
        update: Vec::with_capacity(updates.len()),
        delete: Vec::new(),
    };

    for update in updates {
        let path = wire_path("", &update.path);
        match &update.value {
            Some(value) => notification.update.push(proto::Update {
                path: Some(path),
                val: Some(typed_value(value, encoding)?),
            }),
            None => notification.delete.push(path),
        }
    }
    Ok(notification)
}

pub(crate) fn get_response(
    updates: &[UpdateEvent],
    encoding: Encoding,
) -> std::result::Result<proto::GetResponse, Status> {
    let notification = updates
        .iter()
        .map(|u| notification(u.timestamp, std::slice::from_ref(u), encoding))
        .collect::<std::result::Result<Vec<_>, Status>>()?;
    Ok(proto::GetResponse { notification })
}

fn update_response(
    emission: &Emission,
    encoding: Encoding,
) -> std::result::Result<proto::SubscribeResponse, Status> {
    Ok(proto::SubscribeResponse {
        response: Some(subscribe_response::Response::Update(notification(
            emission.timestamp,
            &emission.updates,
            encoding,
        )?)),
    })
}

/// Wire form of a session event.
///
/// `None` ends the response stream without a message; failures end it with a
/// status.
pub(crate) fn subscribe_response(
    event: SessionEvent,
    encoding: Encoding,
) -> Option<std::result::Result<proto::SubscribeResponse, Status>> {
    match event {
        SessionEvent::Update(emission) => Some(update_response(&emission, encoding)),
        SessionEvent::Sync => Some(Ok(proto::SubscribeResponse {
            response: Some(subscribe_response::Response::SyncResponse(true)),
        })),
        SessionEvent::Closed { reason, updates_sent } => match reason {
            CloseReason::UpdateLimitReached(_) => Some(Ok(proto::SubscribeResponse {
                response: Some(subscribe_response::Response::Closed(proto::SessionClosed {
                    reason: reason.to_string(),
                    updates_sent,
                })),
            })),
            CloseReason::Completed | CloseReason::ClientCancelled => None,
            CloseReason::StoreFailure(_) | CloseReason::Shutdown => Some(Err(Status::unavailable(reason.to_string()))),
            CloseReason::Aborted(_) => Some(Err(Status::internal(reason.to_string()))),
        },
    }
}

pub(crate) fn capability_response(capabilities: Capabilities) -> proto::CapabilityResponse {
    proto::CapabilityResponse {
        supported_models: capabilities
            .targets
            .into_iter()
            .map(|name| proto::ModelData {
                name,
                organization: "SONiC".into(),
                version: capabilities.build_version.clone(),
            })
            .collect(),
        supported_encodings: vec![Encoding::Json as i32, Encoding::JsonIetf as i32],
        gnmi_version: capabilities.gnmi_version.to_string(),
    }
}

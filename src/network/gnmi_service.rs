//! `gnmi.gNMI` service on top of [`TelemetryServer`]
//!
//! ```text
//! Subscribe(stream SubscribeRequest)
//!   first message: SubscriptionList -> TelemetryServer::subscribe() -> SessionStream
//!   later messages: Poll -> Poller (POLL sessions only)
//! SessionStream -> convert::subscribe_response -> stream SubscribeResponse
//! ```
//!
//! Dropping the response stream, which tonic does when the client goes away,
//! cancels the session.

use std::pin::Pin;
use std::sync::Arc;

use futures::future;
use futures::Stream;
use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tonic::Streaming;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::convert;
use crate::proto;
use crate::proto::g_nmi_server::GNmi;
use crate::proto::subscribe_request;
use crate::proto::CapabilityRequest;
use crate::proto::CapabilityResponse;
use crate::proto::GetResponse;
use crate::proto::SubscribeRequest;
use crate::proto::SubscribeResponse;
use crate::server::record_get_outcome;
use crate::server::record_rejection;
use crate::server::Poller;
use crate::server::TelemetryResponse;
use crate::server::TelemetryServer;
use crate::Error;
use crate::SessionError;
use crate::SessionId;
use crate::TelemetryRequest;

#[derive(Debug, Clone)]
pub struct GnmiService {
    server: Arc<TelemetryServer>,
}

impl GnmiService {
    pub fn new(server: Arc<TelemetryServer>) -> Self {
        Self { server }
    }
}

#[tonic::async_trait]
impl GNmi for GnmiService {
    type SubscribeStream = Pin<Box<dyn Stream<Item = Result<SubscribeResponse, Status>> + Send>>;

    async fn capabilities(
        &self,
        _request: Request<CapabilityRequest>,
    ) -> std::result::Result<Response<CapabilityResponse>, Status> {
        Ok(Response::new(convert::capability_response(self.server.capabilities())))
    }

    async fn get(
        &self,
        request: Request<proto::GetRequest>,
    ) -> std::result::Result<Response<GetResponse>, Status> {
        let request = request.into_inner();
        let target = request
            .prefix
            .as_ref()
            .map(|prefix| prefix.target.clone())
            .unwrap_or_default();

        // resolution reads the store too, so it shares the GET budget
        let served = async {
            let (get, encoding) = match convert::get_request(self.server.resolver(), request).await {
                Ok(converted) => converted,
                Err(e) => {
                    record_get_outcome(Some(&e));
                    return Err(Status::from(e));
                }
            };
            match self.server.handle(TelemetryRequest::Get(get)).await? {
                TelemetryResponse::Get(updates) => convert::get_response(&updates, encoding),
                TelemetryResponse::Subscribe(_) => Err(Status::internal("GET answered with a session")),
            }
        };

        match timeout(self.server.get_timeout(), served).await {
            Ok(response) => response.map(Response::new),
            Err(_) => {
                let e = self.server.get_timed_out(&target, "request");
                record_get_outcome(Some(&e));
                Err(e.into())
            }
        }
    }

    async fn subscribe(
        &self,
        request: Request<Streaming<SubscribeRequest>>,
    ) -> std::result::Result<Response<Self::SubscribeStream>, Status> {
        let remote_addr = request.remote_addr();
        let mut inbound = request.into_inner();

        let list = match inbound.message().await? {
            Some(SubscribeRequest {
                request: Some(subscribe_request::Request::Subscribe(list)),
            }) => list,
            _ => {
                let e: Error = SessionError::MissingSubscriptionList.into();
                record_rejection(&e);
                return Err(e.into());
            }
        };

        let (request, encoding) = match convert::subscription_request(self.server.resolver(), list).await {
            Ok(converted) => converted,
            Err(e) => {
                record_rejection(&e);
                return Err(e.into());
            }
        };

        let mut stream = self.server.subscribe(request).await?;
        info!(session_id = %stream.id(), ?remote_addr, "Subscribe stream opened");

        tokio::spawn(forward_client_messages(
            stream.id(),
            inbound,
            stream.take_poller(),
            stream.cancel_token(),
        ));

        let responses = stream.filter_map(move |event| future::ready(convert::subscribe_response(event, encoding)));
        Ok(Response::new(Box::pin(responses)))
    }
}

/// Reads the rest of the client stream.
///
/// Poll messages drive POLL sessions; the end of the client stream ends a
/// POLL session; a broken client stream cancels any session.
async fn forward_client_messages(
    session_id: SessionId,
    mut inbound: Streaming<SubscribeRequest>,
    poller: Option<Poller>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = inbound.message() => message,
        };

        match message {
            Ok(Some(SubscribeRequest {
                request: Some(subscribe_request::Request::Poll(_)),
            })) => match &poller {
                Some(poller) => {
                    if !poller.poll().await {
                        break;
                    }
                }
                None => warn!(%session_id, "poll on a non POLL session ignored"),
            },
            Ok(Some(SubscribeRequest {
                request: Some(subscribe_request::Request::Subscribe(_)),
            })) => warn!(%session_id, "second SubscriptionList ignored"),
            Ok(Some(SubscribeRequest { request: None })) => {}
            Ok(None) => {
                debug!(%session_id, "client closed its side of the stream");
                break;
            }
            Err(status) => {
                debug!(%session_id, "client stream failed: {}", status);
                cancel.cancel();
                break;
            }
        }
    }
}

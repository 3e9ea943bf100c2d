use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};
use serde::Deserialize;
use tessera::{
    clock::Clock, notify::Notifier, store::RecordStore, AccessToken, Identity, TokenAuthority,
    TokenPair, TransportToken,
};
use uuid::Uuid;

use crate::{address::SourceAddress, error::ApiError};

#[derive(Debug, Deserialize)]
pub(crate) struct IssueParams {
    client_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshRequest {
    access_token: AccessToken,
    refresh_token: TransportToken,
}

pub(crate) async fn issue_tokens<S, N, C>(
    State(authority): State<Arc<TokenAuthority<S, N, C>>>,
    SourceAddress(source_address): SourceAddress,
    params: Result<Query<IssueParams>, QueryRejection>,
) -> Result<Json<TokenPair>, ApiError>
where
    S: RecordStore + 'static,
    N: Notifier + 'static,
    C: Clock + 'static,
{
    let Query(params) = params.map_err(|_| ApiError::InvalidClientId)?;
    let identity = Identity::from_uuid(params.client_id);
    if identity.is_nil() {
        return Err(ApiError::InvalidClientId);
    }

    let pair = authority.issue(identity, source_address).await?;
    Ok(Json(pair))
}

pub(crate) async fn refresh_tokens<S, N, C>(
    State(authority): State<Arc<TokenAuthority<S, N, C>>>,
    SourceAddress(source_address): SourceAddress,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError>
where
    S: RecordStore + 'static,
    N: Notifier + 'static,
    C: Clock + 'static,
{
    let Json(request) = body.map_err(|_| ApiError::InvalidRequest)?;
    if request.access_token.as_str().is_empty() || request.refresh_token.as_str().is_empty() {
        return Err(ApiError::InvalidRequest);
    }

    let pair = authority
        .rotate(&request.access_token, &request.refresh_token, source_address)
        .await?;
    Ok(Json(pair))
}

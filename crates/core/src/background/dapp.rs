use super::confirm::request_confirm;
use super::preview::sign_preview;
use super::BackgroundContext;
use crate::error::DAppError;
use crate::types::{
    is_address_valid, is_hex_payload, AppMetadata, ConfirmationDecision, ConfirmationPayload,
    DAppRequest, DAppResponse, DAppSession, ExtensionNotification, Network,
};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Entry point for the native page protocol: `payload` is the page's request
/// object, the result is the page's response object.
pub async fn handle_page_payload(
    ctx: &BackgroundContext,
    origin: &str,
    payload: Value,
) -> Result<Value, DAppError> {
    let request: DAppRequest = serde_json::from_value(payload).map_err(|e| {
        debug!("[dapp] malformed request from {}: {}", origin, e);
        DAppError::InvalidParams
    })?;
    let response = dispatch(ctx, origin, request).await?;
    serde_json::to_value(response).map_err(|e| DAppError::unknown(e.to_string()))
}

pub async fn dispatch(
    ctx: &BackgroundContext,
    origin: &str,
    request: DAppRequest,
) -> Result<DAppResponse, DAppError> {
    debug!("[dapp] {} request from {}", request.kind(), origin);
    match request {
        DAppRequest::GetCurrentPermissionRequest => get_current_permission(ctx, origin).await,
        DAppRequest::PermissionRequest {
            network,
            app_meta,
            force,
        } => request_permission(ctx, origin, network, app_meta, force.unwrap_or(false)).await,
        DAppRequest::OperationRequest {
            source_pkh,
            op_params,
        } => request_operation(ctx, origin, source_pkh, op_params).await,
        DAppRequest::SignRequest {
            source_pkh,
            payload,
        } => request_sign(ctx, origin, source_pkh, payload).await,
        DAppRequest::BroadcastRequest { signed_op_bytes } => {
            request_broadcast(ctx, origin, signed_op_bytes).await
        }
        DAppRequest::DisconnectRequest => request_disconnect(ctx, origin).await,
    }
}

pub async fn get_current_permission(
    ctx: &BackgroundContext,
    origin: &str,
) -> Result<DAppResponse, DAppError> {
    let permission = ctx
        .store
        .get(origin)
        .await?
        .and_then(|s| s.permission(&ctx.config.networks));
    Ok(DAppResponse::GetCurrentPermissionResponse { permission })
}

pub async fn request_permission(
    ctx: &BackgroundContext,
    origin: &str,
    network: Network,
    app_meta: AppMetadata,
    force: bool,
) -> Result<DAppResponse, DAppError> {
    if !network.is_allowed(&ctx.config.networks) || app_meta.name.trim().is_empty() {
        return Err(DAppError::InvalidParams);
    }
    let network_rpc = network
        .rpc_url(&ctx.config.networks)
        .ok_or(DAppError::InvalidParams)?;

    if !force {
        if let Some(existing) = ctx.store.get(origin).await? {
            if existing.matches(&network, &app_meta) {
                if let Some(permission) = existing.permission(&ctx.config.networks) {
                    debug!("[dapp] reusing grant for {}", origin);
                    return Ok(permission.into());
                }
            }
        }
    }

    let payload = ConfirmationPayload::Connect {
        origin: origin.to_string(),
        network_rpc: network_rpc.clone(),
        app_meta: app_meta.clone(),
    };

    request_confirm(ctx, payload, ctx.config.timeouts.connect(), |decision| async move {
        let ConfirmationDecision::Permission {
            account_public_key_hash: Some(pkh),
            account_public_key: Some(public_key),
            ..
        } = decision
        else {
            return Err(DAppError::NotGranted);
        };

        let session = DAppSession {
            network,
            app_meta,
            pkh: pkh.clone(),
            public_key: public_key.clone(),
        };
        // Persist before answering.
        ctx.store.set(origin, session).await?;
        info!("[dapp] {} granted to {}", origin, pkh);

        Ok(DAppResponse::PermissionResponse {
            pkh,
            public_key,
            rpc: network_rpc,
        })
    })
    .await
}

pub async fn request_operation(
    ctx: &BackgroundContext,
    origin: &str,
    source_pkh: String,
    op_params: Vec<Value>,
) -> Result<DAppResponse, DAppError> {
    if !is_address_valid(&source_pkh) || !are_op_params_valid(&op_params) {
        return Err(DAppError::InvalidParams);
    }
    let (session, network_rpc) = granted_session(ctx, origin, Some(&source_pkh)).await?;

    let payload = ConfirmationPayload::ConfirmOperations {
        origin: origin.to_string(),
        network_rpc: network_rpc.clone(),
        app_meta: session.app_meta.clone(),
        source_pkh: source_pkh.clone(),
        source_public_key: session.public_key.clone(),
        op_params: op_params.clone(),
    };

    request_confirm(ctx, payload, ctx.config.timeouts.operations(), |decision| async move {
        let mut op_params = op_params;
        match decision {
            ConfirmationDecision::Operations {
                modified_total_fee,
                modified_storage_limit,
                ..
            } => apply_overrides(&mut op_params, modified_total_fee, modified_storage_limit),
            ConfirmationDecision::Generic { .. } => {}
            _ => return Err(DAppError::NotGranted),
        }

        let op_hash = ctx
            .vault
            .send_operations(&source_pkh, &network_rpc, &op_params)
            .await?;
        info!("[dapp] {} sent operation {}", origin, op_hash);
        Ok(DAppResponse::OperationResponse { op_hash })
    })
    .await
}

pub async fn request_sign(
    ctx: &BackgroundContext,
    origin: &str,
    source_pkh: String,
    payload: String,
) -> Result<DAppResponse, DAppError> {
    if !is_address_valid(&source_pkh) || !is_hex_payload(&payload) {
        return Err(DAppError::InvalidParams);
    }
    let (session, network_rpc) = granted_session(ctx, origin, Some(&source_pkh)).await?;

    let preview = sign_preview(ctx.parser.as_ref(), &payload, &network_rpc).await;
    let confirmation = ConfirmationPayload::Sign {
        origin: origin.to_string(),
        network_rpc,
        app_meta: session.app_meta.clone(),
        source_pkh: source_pkh.clone(),
        source_public_key: session.public_key.clone(),
        payload: payload.clone(),
        preview,
    };

    request_confirm(ctx, confirmation, ctx.config.timeouts.sign(), |decision| async move {
        if !matches!(
            decision,
            ConfirmationDecision::Sign { .. } | ConfirmationDecision::Generic { .. }
        ) {
            return Err(DAppError::NotGranted);
        }
        let signature = ctx.vault.sign(&source_pkh, &payload).await?;
        Ok(DAppResponse::SignResponse { signature })
    })
    .await
}

/// Injects bytes the DApp already signed. Needs a grant but no popup.
pub async fn request_broadcast(
    ctx: &BackgroundContext,
    origin: &str,
    signed_op_bytes: String,
) -> Result<DAppResponse, DAppError> {
    if !is_hex_payload(&signed_op_bytes) {
        return Err(DAppError::InvalidParams);
    }
    let (_, network_rpc) = granted_session(ctx, origin, None).await?;

    let op_hash = ctx
        .node
        .inject_operation(&network_rpc, &signed_op_bytes)
        .await
        .map_err(|e| DAppError::Broadcast(e.to_string()))?;
    info!("[dapp] {} broadcast {}", origin, op_hash);
    Ok(DAppResponse::BroadcastResponse { op_hash })
}

pub async fn request_disconnect(
    ctx: &BackgroundContext,
    origin: &str,
) -> Result<DAppResponse, DAppError> {
    if ctx.store.get(origin).await?.is_none() {
        return Err(DAppError::NotGranted);
    }
    remove_dapps(ctx, vec![origin.to_string()]).await?;
    Ok(DAppResponse::DisconnectResponse)
}

/// Every granted origin, for the wallet's connected-sites list.
pub async fn dapp_sessions(
    ctx: &BackgroundContext,
) -> Result<Vec<(String, DAppSession)>, DAppError> {
    Ok(ctx.store.all().await?)
}

/// Drops the grants of `origins` and tells every content script about it.
pub async fn remove_dapps(
    ctx: &BackgroundContext,
    origins: Vec<String>,
) -> Result<(), DAppError> {
    if origins.is_empty() {
        return Ok(());
    }
    ctx.store.remove(&origins).await?;
    info!("[dapp] disconnected {:?}", origins);
    ctx.intercom
        .broadcast(ExtensionNotification::DAppsDisconnected { origins });
    Ok(())
}

/// Looks up the grant of `origin` and, when `source_pkh` is given, checks it
/// is the granted account.
async fn granted_session(
    ctx: &BackgroundContext,
    origin: &str,
    source_pkh: Option<&str>,
) -> Result<(DAppSession, String), DAppError> {
    let session = ctx.store.get(origin).await?.ok_or(DAppError::NotGranted)?;
    if let Some(pkh) = source_pkh {
        if session.pkh != pkh {
            return Err(DAppError::NotFound);
        }
    }
    let rpc = session.network.rpc_url(&ctx.config.networks).ok_or_else(|| {
        warn!("[dapp] grant of {} points at an unknown network", origin);
        DAppError::NotGranted
    })?;
    Ok((session, rpc))
}

fn are_op_params_valid(op_params: &[Value]) -> bool {
    !op_params.is_empty()
        && op_params
            .iter()
            .all(|op| op.get("kind").and_then(Value::as_str).is_some_and(|k| !k.is_empty()))
}

/// Applies the fee and storage limit the user edited in the popup. The whole
/// fee difference lands on the first operation, as does the storage limit.
fn apply_overrides(op_params: &mut [Value], total_fee: Option<u64>, storage_limit: Option<u64>) {
    let Some((first, rest)) = op_params.split_first_mut() else {
        return;
    };

    if let Some(total_fee) = total_fee {
        let others: u64 = rest.iter().filter_map(|op| json_u64(op.get("fee"))).sum();
        first["fee"] = Value::from(total_fee.saturating_sub(others));
    }
    if let Some(storage_limit) = storage_limit {
        first["storageLimit"] = Value::from(storage_limit);
    }
}

/// Fees arrive as numbers or numeric strings.
fn json_u64(v: Option<&Value>) -> Option<u64> {
    match v? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

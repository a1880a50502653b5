use crate::error::DAppError;
use crate::intercom::IntercomClient;
use crate::types::{ConfirmationPayload, ExtensionRequest, ExtensionResponse};
use std::rc::Rc;
use tracing::debug;

/// Popup side of a single confirmation: fetches what to show and sends the
/// user's answer back under the same correlation id.
pub struct ConfirmationClient {
    client: Rc<IntercomClient>,
    id: String,
}

impl ConfirmationClient {
    pub fn new(client: Rc<IntercomClient>, id: impl Into<String>) -> Self {
        Self {
            client,
            id: id.into(),
        }
    }

    /// Reads the correlation id from the popup url fragment (`#?id=...`).
    pub fn from_location_hash(client: Rc<IntercomClient>, hash: &str) -> Option<Self> {
        let query = hash.trim_start_matches('#').trim_start_matches('?');
        let id = url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.into_owned())
            .filter(|id| !id.is_empty())?;
        Some(Self::new(client, id))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn payload(&self) -> Result<ConfirmationPayload, DAppError> {
        let request = ExtensionRequest::GetPayloadRequest { id: self.id.clone() };
        match self.client.request(request).await? {
            ExtensionResponse::GetPayloadResponse { payload } => Ok(payload),
            other => Err(DAppError::unknown(format!("unexpected response {:?}", other))),
        }
    }

    pub async fn confirm(&self, confirmed: bool) -> Result<(), DAppError> {
        self.decide(ExtensionRequest::ConfirmationRequest {
            id: self.id.clone(),
            confirmed,
        })
        .await
    }

    pub async fn confirm_permission(
        &self,
        confirmed: bool,
        account_public_key_hash: Option<String>,
        account_public_key: Option<String>,
    ) -> Result<(), DAppError> {
        self.decide(ExtensionRequest::PermConfirmationRequest {
            id: self.id.clone(),
            confirmed,
            account_public_key_hash,
            account_public_key,
        })
        .await
    }

    pub async fn confirm_operations(
        &self,
        confirmed: bool,
        modified_total_fee: Option<u64>,
        modified_storage_limit: Option<u64>,
    ) -> Result<(), DAppError> {
        self.decide(ExtensionRequest::OpsConfirmationRequest {
            id: self.id.clone(),
            confirmed,
            modified_total_fee,
            modified_storage_limit,
        })
        .await
    }

    pub async fn confirm_sign(&self, confirmed: bool) -> Result<(), DAppError> {
        self.decide(ExtensionRequest::SignConfirmationRequest {
            id: self.id.clone(),
            confirmed,
        })
        .await
    }

    async fn decide(&self, request: ExtensionRequest) -> Result<(), DAppError> {
        debug!("[confirm] popup answering {}", self.id);
        match self.client.request(request).await? {
            ExtensionResponse::ConfirmationResponse => Ok(()),
            other => Err(DAppError::unknown(format!("unexpected response {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercom::channel;

    fn client() -> Rc<IntercomClient> {
        let (ours, _theirs) = channel();
        Rc::new(IntercomClient::new(ours))
    }

    #[test]
    fn test_id_from_location_hash() {
        let c = ConfirmationClient::from_location_hash(client(), "#?id=0b6f-42").unwrap();
        assert_eq!(c.id(), "0b6f-42");
        assert!(ConfirmationClient::from_location_hash(client(), "#?id=").is_none());
        assert!(ConfirmationClient::from_location_hash(client(), "").is_none());
    }
}

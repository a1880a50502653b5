use super::services::OperationParser;
use crate::types::SignPreview;
use tracing::debug;

/// Watermark of a generic Tezos operation.
const OPERATION_WATERMARK: &str = "03";
/// Watermark of a packed Micheline expression.
const MICHELINE_WATERMARK: u8 = 0x05;
const MICHELINE_STRING_TAG: u8 = 0x01;

/// Best-effort human readable view of the bytes a DApp wants signed.
/// Failing to understand the payload is not an error: the popup then shows
/// the raw bytes only.
pub async fn sign_preview(
    parser: &dyn OperationParser,
    payload: &str,
    rpc: &str,
) -> Option<SignPreview> {
    if let Some(forged) = payload.strip_prefix(OPERATION_WATERMARK) {
        let parsed = parser.parse_forged(forged, rpc).await;
        let has_contents = parsed
            .as_ref()
            .and_then(|v| v.get("contents"))
            .and_then(|c| c.as_array())
            .is_some_and(|c| !c.is_empty());
        if has_contents {
            return parsed.map(SignPreview::Operations);
        }
        debug!("[dapp] sign payload has operation watermark but does not parse");
        return None;
    }

    micheline_string(payload).map(SignPreview::Message)
}

/// Decodes `05 01 <u32 len> <utf8>`, the packed form of a Micheline string.
fn micheline_string(payload: &str) -> Option<String> {
    let bytes = hex::decode(payload).ok()?;
    let (&watermark, rest) = bytes.split_first()?;
    let (&tag, rest) = rest.split_first()?;
    if watermark != MICHELINE_WATERMARK || tag != MICHELINE_STRING_TAG || rest.len() < 4 {
        return None;
    }
    let (len, body) = rest.split_at(4);
    let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
    if body.len() != len {
        return None;
    }
    String::from_utf8(body.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FixedParser(Option<Value>);

    #[async_trait(?Send)]
    impl OperationParser for FixedParser {
        async fn parse_forged(&self, _bytes: &str, _rpc: &str) -> Option<Value> {
            self.0.clone()
        }
    }

    fn packed(s: &str) -> String {
        let mut bytes = vec![0x05, 0x01];
        bytes.extend_from_slice(&(s.len() as u32).to_be_bytes());
        bytes.extend_from_slice(s.as_bytes());
        hex::encode(bytes)
    }

    #[tokio::test]
    async fn test_operation_preview_requires_contents() {
        let parsed = json!({ "branch": "BL", "contents": [{ "kind": "transaction" }] });
        let parser = FixedParser(Some(parsed.clone()));
        assert_eq!(
            sign_preview(&parser, "03aabb", "https://rpc").await,
            Some(SignPreview::Operations(parsed))
        );

        let empty = FixedParser(Some(json!({ "branch": "BL", "contents": [] })));
        assert_eq!(sign_preview(&empty, "03aabb", "https://rpc").await, None);

        let broken = FixedParser(None);
        assert_eq!(sign_preview(&broken, "03zz", "https://rpc").await, None);
    }

    #[tokio::test]
    async fn test_message_preview() {
        let parser = FixedParser(None);
        let msg = "Tezos Signed Message: hello";
        assert_eq!(
            sign_preview(&parser, &packed(msg), "https://rpc").await,
            Some(SignPreview::Message(msg.into()))
        );

        // Length prefix disagrees with the body.
        let mut bad = packed(msg);
        bad.push_str("00");
        assert_eq!(sign_preview(&parser, &bad, "https://rpc").await, None);
        assert_eq!(sign_preview(&parser, "deadbeef", "https://rpc").await, None);
    }
}

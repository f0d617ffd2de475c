//! CosmJS-style offline signers backed by the wallet.

use crate::canonical::{CosmosRequest, SignDoc, WalletRequest};
use crate::client::Client;
use crate::error::ConnectResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One account exposed by the wallet for a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    #[serde(alias = "bech32Address")]
    pub address: String,
    #[serde(default = "default_algo")]
    pub algo: String,
    #[serde(default)]
    pub pub_key: Value,
}

fn default_algo() -> String {
    "secp256k1".to_string()
}

/// Wallet replies arrive as `{"result": body}`; a JSON body is decoded, any
/// other body is returned as a string.
pub fn reply_body(reply: Value) -> Value {
    match reply.get("result") {
        Some(Value::String(body)) => serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.clone())),
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

async fn accounts(client: &Client, chain_id: &str) -> ConnectResult<Vec<AccountData>> {
    let reply = client
        .request(WalletRequest::Cosmos(CosmosRequest::GetKey { chain_id: chain_id.to_string() }))
        .await?;
    Ok(match reply_body(reply) {
        Value::Array(list) => list
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?,
        Value::Null => Vec::new(),
        single => vec![serde_json::from_value(single)?],
    })
}

async fn sign_amino(client: &Client, chain_id: &str, signer: &str, sign_doc: Value) -> ConnectResult<Value> {
    let reply = client
        .request(WalletRequest::Cosmos(CosmosRequest::SignAmino {
            chain_id: chain_id.to_string(),
            signer_address: signer.to_string(),
            sign_doc,
        }))
        .await?;
    Ok(reply_body(reply))
}

/// Direct and amino signer bound to one chain.
#[derive(Clone)]
pub struct OfflineSigner {
    chain_id: String,
    client: Client,
}

impl OfflineSigner {
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub async fn get_accounts(&self) -> ConnectResult<Vec<AccountData>> {
        accounts(&self.client, &self.chain_id).await
    }

    pub async fn sign_direct(&self, signer: &str, sign_doc: SignDoc) -> ConnectResult<Value> {
        let reply = self
            .client
            .request(WalletRequest::Cosmos(CosmosRequest::SignDirect {
                chain_id: self.chain_id.clone(),
                signer_address: signer.to_string(),
                sign_doc,
            }))
            .await?;
        Ok(reply_body(reply))
    }

    pub async fn sign_amino(&self, signer: &str, sign_doc: Value) -> ConnectResult<Value> {
        sign_amino(&self.client, &self.chain_id, signer, sign_doc).await
    }
}

/// Amino-only signer bound to one chain.
#[derive(Clone)]
pub struct OfflineSignerOnlyAmino {
    chain_id: String,
    client: Client,
}

impl OfflineSignerOnlyAmino {
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub async fn get_accounts(&self) -> ConnectResult<Vec<AccountData>> {
        accounts(&self.client, &self.chain_id).await
    }

    pub async fn sign_amino(&self, signer: &str, sign_doc: Value) -> ConnectResult<Value> {
        sign_amino(&self.client, &self.chain_id, signer, sign_doc).await
    }
}

impl Client {
    pub fn offline_signer(&self, chain_id: impl Into<String>) -> OfflineSigner {
        OfflineSigner { chain_id: chain_id.into(), client: self.clone() }
    }

    /// Same as [`Client::offline_signer`]; the wallet supports direct signing.
    pub fn offline_signer_auto(&self, chain_id: impl Into<String>) -> OfflineSigner {
        self.offline_signer(chain_id)
    }

    pub fn offline_signer_only_amino(&self, chain_id: impl Into<String>) -> OfflineSignerOnlyAmino {
        OfflineSignerOnlyAmino { chain_id: chain_id.into(), client: self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_bodies_decode() {
        assert_eq!(reply_body(json!({"result": "{\"a\":1}"})), json!({"a": 1}));
        assert_eq!(reply_body(json!({"result": "sig"})), json!("sig"));
        assert_eq!(reply_body(json!({})), Value::Null);
    }

    #[test]
    fn account_aliases() {
        let account: AccountData =
            serde_json::from_value(json!({"bech32Address": "cosmos1abc", "pubKey": [1, 2]})).unwrap();
        assert_eq!(account.address, "cosmos1abc");
        assert_eq!(account.algo, "secp256k1");
        assert_eq!(account.pub_key, json!([1, 2]));
    }
}

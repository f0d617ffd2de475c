//! Parameter canonicalization - chain-aware params rewriting
//!
//! Requests are typed per chain family. `canonicalize` rewrites binary payloads
//! into the base-58 text the wallet expects and is pure: canonical input comes
//! back unchanged, so nothing is ever encoded twice.
//!
//! | Method | Rewrite |
//! |--------|---------|
//! | `sol_sign` | transaction → base-58 serialized message, flag `message`/`transaction` |
//! | `sol_signAllTransactions` | each transaction → base-58, drop falsy, JSON string |
//! | `sol_signMessage` | text/bytes → base-58 |
//! | `cosmos_signDirect` | `signDoc.bodyBytes`, `signDoc.authInfoBytes` → base-58 |
//! | anything else | unchanged |

use crate::error::{ConnectError, ConnectResult};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

pub const CONNECT_METHOD: &str = "connect";

pub mod methods {
    pub const SOL_SIGN: &str = "sol_sign";
    pub const SOL_SIGN_ALL: &str = "sol_signAllTransactions";
    pub const SOL_SIGN_MESSAGE: &str = "sol_signMessage";
    pub const COSMOS_SIGN_DIRECT: &str = "cosmos_signDirect";
    pub const COSMOS_SIGN_AMINO: &str = "cosmos_signAmino";
    pub const COSMOS_GET_KEY: &str = "cosmos_getKey";
}

/// Chain family selected by the method prefix (segment before the first `_`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainNamespace {
    Solana,
    Cosmos,
    Other,
}

impl ChainNamespace {
    pub fn of(method: &str) -> Self {
        match method.split('_').next().unwrap_or_default() {
            "sol" => ChainNamespace::Solana,
            "cosmos" => ChainNamespace::Cosmos,
            _ => ChainNamespace::Other,
        }
    }
}

/// Anything that can produce the wire bytes of a transaction message.
pub trait SerializeMessage: Send + Sync + fmt::Debug {
    fn serialize_message(&self) -> Vec<u8>;
}

/// Binary field that is either still raw or already in canonical base-58 form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binary {
    /// UTF-8 text, encoded as its bytes
    Text(String),
    Raw(Vec<u8>),
    Base58(String),
}

impl Binary {
    pub fn canonicalize(self) -> Self {
        match self {
            Binary::Text(s) => Binary::Base58(bs58::encode(s.as_bytes()).into_string()),
            Binary::Raw(bytes) => Binary::Base58(bs58::encode(bytes).into_string()),
            encoded @ Binary::Base58(_) => encoded,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Binary::Text(s) | Binary::Base58(s) => Value::String(s.clone()),
            Binary::Raw(bytes) => bytes_to_value(bytes),
        }
    }

    /// Strings are read as `string_form`; byte arrays and `Buffer` JSON as raw.
    fn from_value(value: &Value, string_form: fn(String) -> Binary) -> Option<Self> {
        match value {
            Value::String(s) => Some(string_form(s.clone())),
            other => value_to_bytes(other).map(Binary::Raw),
        }
    }
}

/// First parameter of `sol_sign` and the elements of `sol_signAllTransactions`.
#[derive(Debug, Clone)]
pub enum SolanaPayload {
    Text(String),
    Bytes(Vec<u8>),
    Transaction(Arc<dyn SerializeMessage>),
    /// Base-58 serialized transaction message
    Serialized(String),
    /// Opaque value without the serialize capability; forwarded as is.
    Value(Value),
}

impl SolanaPayload {
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => SolanaPayload::Text(s),
            other => match value_to_bytes(&other) {
                Some(bytes) if other.is_array() => SolanaPayload::Bytes(bytes),
                _ => SolanaPayload::Value(other),
            },
        }
    }

    /// Flag the wallet uses to tell plain messages from transactions.
    pub fn kind(&self) -> &'static str {
        match self {
            SolanaPayload::Text(_) | SolanaPayload::Bytes(_) => "message",
            SolanaPayload::Value(v) if v.is_string() || v.is_array() => "message",
            _ => "transaction",
        }
    }

    pub fn canonicalize(self) -> Self {
        match self {
            SolanaPayload::Transaction(tx) => {
                SolanaPayload::Serialized(bs58::encode(tx.serialize_message()).into_string())
            }
            other => other,
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            SolanaPayload::Text(s) | SolanaPayload::Serialized(s) => !s.is_empty(),
            SolanaPayload::Bytes(_) | SolanaPayload::Transaction(_) => true,
            SolanaPayload::Value(v) => is_truthy(v),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            SolanaPayload::Text(s) | SolanaPayload::Serialized(s) => Value::String(s.clone()),
            SolanaPayload::Bytes(bytes) => bytes_to_value(bytes),
            SolanaPayload::Transaction(tx) => {
                Value::String(bs58::encode(tx.serialize_message()).into_string())
            }
            SolanaPayload::Value(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SolanaRequest {
    Sign { payload: SolanaPayload, extra: Vec<Value> },
    SignAllTransactions { transactions: Vec<SolanaPayload>, extra: Vec<Value> },
    SignMessage { message: Binary, extra: Vec<Value> },
    Other { method: String, params: Vec<Value> },
}

impl SolanaRequest {
    pub fn sign(payload: SolanaPayload) -> Self {
        Self::Sign { payload, extra: Vec::new() }
    }
    pub fn sign_all(transactions: Vec<SolanaPayload>) -> Self {
        Self::SignAllTransactions { transactions, extra: Vec::new() }
    }
    pub fn sign_message(message: Binary) -> Self {
        Self::SignMessage { message, extra: Vec::new() }
    }
}

/// Cosmos `SignDoc` with the two protobuf byte fields kept typed.
#[derive(Debug, Clone, PartialEq)]
pub struct SignDoc {
    pub body_bytes: Binary,
    pub auth_info_bytes: Binary,
    pub chain_id: String,
    pub account_number: Value,
}

impl SignDoc {
    pub fn new(body_bytes: Vec<u8>, auth_info_bytes: Vec<u8>, chain_id: impl Into<String>, account_number: u64) -> Self {
        Self {
            body_bytes: Binary::Raw(body_bytes),
            auth_info_bytes: Binary::Raw(auth_info_bytes),
            chain_id: chain_id.into(),
            account_number: Value::String(account_number.to_string()),
        }
    }

    fn from_value(value: &Value) -> ConnectResult<Self> {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(|v| Binary::from_value(v, Binary::Base58))
                .ok_or_else(|| ConnectError::invalid(format!("signDoc.{name} must be bytes or base58")))
        };
        Ok(Self {
            body_bytes: field("bodyBytes")?,
            auth_info_bytes: field("authInfoBytes")?,
            chain_id: value.get("chainId").and_then(Value::as_str).unwrap_or_default().to_string(),
            account_number: value.get("accountNumber").cloned().unwrap_or(Value::Null),
        })
    }

    pub fn canonicalize(self) -> Self {
        Self {
            body_bytes: self.body_bytes.canonicalize(),
            auth_info_bytes: self.auth_info_bytes.canonicalize(),
            ..self
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "bodyBytes": self.body_bytes.to_value(),
            "authInfoBytes": self.auth_info_bytes.to_value(),
            "chainId": self.chain_id,
            "accountNumber": self.account_number,
        })
    }
}

#[derive(Debug, Clone)]
pub enum CosmosRequest {
    SignDirect { chain_id: String, signer_address: String, sign_doc: SignDoc },
    SignAmino { chain_id: String, signer_address: String, sign_doc: Value },
    GetKey { chain_id: String },
    Other { method: String, params: Vec<Value> },
}

/// A wallet request, typed per method family.
#[derive(Debug, Clone)]
pub enum WalletRequest {
    /// Connect handshake; the value carries the dApp options.
    Connect(Value),
    Solana(SolanaRequest),
    Cosmos(CosmosRequest),
    Other { method: String, params: Vec<Value> },
}

impl WalletRequest {
    pub fn other(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Other { method: method.into(), params }
    }

    /// Parse the untyped `{method, params}` form.
    ///
    /// Raw strings are caller data: a `sol_signMessage` string is UTF-8 text,
    /// so feeding already-encoded output back through here encodes it again.
    /// Pass `Binary::Base58` through the typed constructors to send
    /// pre-encoded data.
    pub fn from_raw(method: &str, params: Vec<Value>) -> ConnectResult<Self> {
        if method == CONNECT_METHOD {
            let options = params.into_iter().next().unwrap_or_else(|| json!({}));
            return Ok(WalletRequest::Connect(options));
        }
        match ChainNamespace::of(method) {
            ChainNamespace::Solana => parse_solana(method, params).map(WalletRequest::Solana),
            ChainNamespace::Cosmos => parse_cosmos(method, params).map(WalletRequest::Cosmos),
            ChainNamespace::Other => Ok(WalletRequest::other(method, params)),
        }
    }

    pub fn method(&self) -> &str {
        match self {
            WalletRequest::Connect(_) => CONNECT_METHOD,
            WalletRequest::Solana(req) => match req {
                SolanaRequest::Sign { .. } => methods::SOL_SIGN,
                SolanaRequest::SignAllTransactions { .. } => methods::SOL_SIGN_ALL,
                SolanaRequest::SignMessage { .. } => methods::SOL_SIGN_MESSAGE,
                SolanaRequest::Other { method, .. } => method.as_str(),
            },
            WalletRequest::Cosmos(req) => match req {
                CosmosRequest::SignDirect { .. } => methods::COSMOS_SIGN_DIRECT,
                CosmosRequest::SignAmino { .. } => methods::COSMOS_SIGN_AMINO,
                CosmosRequest::GetKey { .. } => methods::COSMOS_GET_KEY,
                CosmosRequest::Other { method, .. } => method.as_str(),
            },
            WalletRequest::Other { method, .. } => method.as_str(),
        }
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, WalletRequest::Connect(_))
    }

    pub fn canonicalize(self) -> Self {
        match self {
            WalletRequest::Solana(req) => WalletRequest::Solana(match req {
                SolanaRequest::Sign { payload, extra } => {
                    SolanaRequest::Sign { payload: payload.canonicalize(), extra }
                }
                SolanaRequest::SignAllTransactions { transactions, extra } => {
                    let transactions = transactions
                        .into_iter()
                        .map(SolanaPayload::canonicalize)
                        .filter(SolanaPayload::is_truthy)
                        .collect();
                    SolanaRequest::SignAllTransactions { transactions, extra }
                }
                SolanaRequest::SignMessage { message, extra } => {
                    SolanaRequest::SignMessage { message: message.canonicalize(), extra }
                }
                other => other,
            }),
            WalletRequest::Cosmos(CosmosRequest::SignDirect { chain_id, signer_address, sign_doc }) => {
                WalletRequest::Cosmos(CosmosRequest::SignDirect {
                    chain_id,
                    signer_address,
                    sign_doc: sign_doc.canonicalize(),
                })
            }
            other => other,
        }
    }

    /// Positional params as placed in the envelope.
    pub fn into_params(self) -> Vec<Value> {
        match self {
            WalletRequest::Connect(options) => vec![options],
            WalletRequest::Solana(req) => match req {
                SolanaRequest::Sign { payload, extra } => {
                    let kind = payload.kind();
                    let mut params = vec![payload.to_value(), Value::String(kind.into())];
                    params.extend(extra);
                    params
                }
                SolanaRequest::SignAllTransactions { transactions, extra } => {
                    let list = Value::Array(transactions.iter().map(SolanaPayload::to_value).collect());
                    let mut params = vec![Value::String(list.to_string())];
                    params.extend(extra);
                    params
                }
                SolanaRequest::SignMessage { message, extra } => {
                    let mut params = vec![message.to_value()];
                    params.extend(extra);
                    params
                }
                SolanaRequest::Other { params, .. } => params,
            },
            WalletRequest::Cosmos(req) => match req {
                CosmosRequest::SignDirect { chain_id, signer_address, sign_doc } => vec![json!({
                    "chainId": chain_id,
                    "signerAddress": signer_address,
                    "signDoc": sign_doc.to_value(),
                })],
                CosmosRequest::SignAmino { chain_id, signer_address, sign_doc } => vec![json!({
                    "chainId": chain_id,
                    "signerAddress": signer_address,
                    "signDoc": sign_doc,
                })],
                CosmosRequest::GetKey { chain_id } => vec![Value::String(chain_id)],
                CosmosRequest::Other { params, .. } => params,
            },
            WalletRequest::Other { params, .. } => params,
        }
    }
}

fn parse_solana(method: &str, params: Vec<Value>) -> ConnectResult<SolanaRequest> {
    let mut iter = params.into_iter();
    match method {
        methods::SOL_SIGN => {
            let first = iter
                .next()
                .ok_or_else(|| ConnectError::invalid("sol_sign requires a payload"))?;
            // params[1] is the message/transaction flag, recomputed on output
            let extra = iter.skip(1).collect();
            Ok(SolanaRequest::Sign { payload: SolanaPayload::from_value(first), extra })
        }
        methods::SOL_SIGN_ALL => match iter.next() {
            Some(Value::Array(items)) => Ok(SolanaRequest::SignAllTransactions {
                transactions: items.into_iter().map(SolanaPayload::from_value).collect(),
                extra: iter.collect(),
            }),
            first => Ok(SolanaRequest::Other {
                method: method.into(),
                params: first.into_iter().chain(iter).collect(),
            }),
        },
        methods::SOL_SIGN_MESSAGE => {
            let message = iter
                .next()
                .and_then(|v| Binary::from_value(&v, Binary::Text))
                .ok_or_else(|| ConnectError::invalid("sol_signMessage requires text or bytes"))?;
            Ok(SolanaRequest::SignMessage { message, extra: iter.collect() })
        }
        _ => Ok(SolanaRequest::Other { method: method.into(), params: iter.collect() }),
    }
}

fn parse_cosmos(method: &str, params: Vec<Value>) -> ConnectResult<CosmosRequest> {
    let first = params.first();
    let text = |key: &str| {
        first
            .and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    match method {
        methods::COSMOS_SIGN_DIRECT => {
            let doc = first
                .and_then(|v| v.get("signDoc"))
                .ok_or_else(|| ConnectError::invalid("cosmos_signDirect requires a signDoc"))?;
            Ok(CosmosRequest::SignDirect {
                chain_id: text("chainId"),
                signer_address: text("signerAddress"),
                sign_doc: SignDoc::from_value(doc)?,
            })
        }
        methods::COSMOS_SIGN_AMINO if first.and_then(|v| v.get("signDoc")).is_some() => {
            Ok(CosmosRequest::SignAmino {
                chain_id: text("chainId"),
                signer_address: text("signerAddress"),
                sign_doc: first.and_then(|v| v.get("signDoc")).cloned().unwrap_or(Value::Null),
            })
        }
        methods::COSMOS_GET_KEY if params.len() == 1 && first.is_some_and(Value::is_string) => {
            Ok(CosmosRequest::GetKey { chain_id: first.and_then(Value::as_str).unwrap_or_default().into() })
        }
        _ => Ok(CosmosRequest::Other { method: method.into(), params }),
    }
}

/// JavaScript truthiness for JSON values.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn bytes_to_value(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
}

/// Byte arrays (`[1,2,3]`) and Node `Buffer` JSON (`{"type":"Buffer","data":[..]}`).
fn value_to_bytes(value: &Value) -> Option<Vec<u8>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) if is_buffer_json(map) => map.get("data")?.as_array()?,
        _ => return None,
    };
    items
        .iter()
        .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

fn is_buffer_json(map: &Map<String, Value>) -> bool {
    map.get("type").and_then(Value::as_str) == Some("Buffer")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeTx(Vec<u8>);

    impl SerializeMessage for FakeTx {
        fn serialize_message(&self) -> Vec<u8> {
            self.0.clone()
        }
    }

    fn canonical_params(method: &str, params: Vec<Value>) -> Vec<Value> {
        WalletRequest::from_raw(method, params).unwrap().canonicalize().into_params()
    }

    #[test]
    fn namespace_from_prefix() {
        assert_eq!(ChainNamespace::of("sol_signMessage"), ChainNamespace::Solana);
        assert_eq!(ChainNamespace::of("cosmos_signDirect"), ChainNamespace::Cosmos);
        assert_eq!(ChainNamespace::of("eth_sendTransaction"), ChainNamespace::Other);
        assert_eq!(ChainNamespace::of("solana_foo"), ChainNamespace::Other);
        assert_eq!(ChainNamespace::of("connect"), ChainNamespace::Other);
    }

    #[test]
    fn sign_message_text_becomes_base58() {
        let params = canonical_params("sol_signMessage", vec![json!("hello")]);
        assert_eq!(params, vec![json!("Cn8eVZg")]);
    }

    #[test]
    fn sign_message_bytes_and_buffer_json() {
        let bytes = canonical_params("sol_signMessage", vec![json!([104, 101, 108, 108, 111])]);
        let buffer = canonical_params(
            "sol_signMessage",
            vec![json!({"type": "Buffer", "data": [104, 101, 108, 108, 111]})],
        );
        assert_eq!(bytes, vec![json!("Cn8eVZg")]);
        assert_eq!(buffer, bytes);
    }

    #[test]
    fn sign_message_is_idempotent() {
        let once = WalletRequest::Solana(SolanaRequest::sign_message(Binary::Text("hello".into()))).canonicalize();
        let twice = once.clone().canonicalize();
        assert_eq!(once.into_params(), twice.into_params());
    }

    #[test]
    fn raw_strings_are_text_typed_base58_is_not() {
        let once = canonical_params("sol_signMessage", vec![json!("hello")]);
        let again = canonical_params("sol_signMessage", once.clone());
        assert_ne!(again, once);

        let typed = WalletRequest::Solana(SolanaRequest::sign_message(Binary::Base58("Cn8eVZg".into())));
        assert_eq!(typed.canonicalize().into_params(), once);
    }

    #[test]
    fn sign_message_rejects_objects() {
        let err = WalletRequest::from_raw("sol_signMessage", vec![json!({"a": 1})]).unwrap_err();
        assert!(matches!(err, ConnectError::InvalidArgument(_)));
    }

    #[test]
    fn sign_flags_messages_and_transactions() {
        let text = canonical_params("sol_sign", vec![json!("hi")]);
        assert_eq!(text, vec![json!("hi"), json!("message")]);

        let bytes = canonical_params("sol_sign", vec![json!([1, 2, 3])]);
        assert_eq!(bytes, vec![json!([1, 2, 3]), json!("message")]);

        let object = canonical_params("sol_sign", vec![json!({"recentBlockhash": "x"}), json!("message")]);
        assert_eq!(object, vec![json!({"recentBlockhash": "x"}), json!("transaction")]);

        let tx = WalletRequest::Solana(SolanaRequest::sign(SolanaPayload::Transaction(Arc::new(FakeTx(vec![0, 1, 2])))));
        let once = tx.canonicalize();
        assert_eq!(once.clone().into_params(), vec![json!("15T"), json!("transaction")]);
        assert_eq!(once.canonicalize().into_params(), vec![json!("15T"), json!("transaction")]);
    }

    #[test]
    fn sign_all_encodes_compacts_and_stringifies() {
        let req = WalletRequest::Solana(SolanaRequest::sign_all(vec![
            SolanaPayload::Transaction(Arc::new(FakeTx(vec![1]))),
            SolanaPayload::Value(Value::Null),
            SolanaPayload::Text(String::new()),
            SolanaPayload::Transaction(Arc::new(FakeTx(vec![]))),
            SolanaPayload::Value(json!({"raw": true})),
        ]));
        let params = req.canonicalize().into_params();
        assert_eq!(params.len(), 1);
        let decoded: Value = serde_json::from_str(params[0].as_str().unwrap()).unwrap();
        assert_eq!(decoded, json!(["2", {"raw": true}]));
    }

    #[test]
    fn sign_all_non_array_passes_through() {
        let params = canonical_params("sol_signAllTransactions", vec![json!("nope")]);
        assert_eq!(params, vec![json!("nope")]);
    }

    #[test]
    fn sign_direct_encodes_byte_fields() {
        let raw = vec![json!({
            "chainId": "cosmoshub-4",
            "signerAddress": "cosmos1xyz",
            "signDoc": {
                "bodyBytes": [1, 2, 3],
                "authInfoBytes": [4, 5, 6],
                "chainId": "cosmoshub-4",
                "accountNumber": "7"
            }
        })];
        let params = canonical_params("cosmos_signDirect", raw);
        let doc = &params[0]["signDoc"];
        assert_eq!(doc["bodyBytes"], json!(bs58::encode([1u8, 2, 3]).into_string()));
        assert_eq!(doc["authInfoBytes"], json!(bs58::encode([4u8, 5, 6]).into_string()));
        assert_eq!(doc["accountNumber"], json!("7"));
        assert_eq!(params[0]["signerAddress"], json!("cosmos1xyz"));

        // Feeding canonical output back in is stable.
        let again = canonical_params("cosmos_signDirect", params.clone());
        assert_eq!(again, params);
    }

    #[test]
    fn sign_direct_without_doc_is_invalid() {
        let err = WalletRequest::from_raw("cosmos_signDirect", vec![json!({})]).unwrap_err();
        assert!(matches!(err, ConnectError::InvalidArgument(_)));
    }

    #[test]
    fn other_methods_pass_through() {
        let params = vec![json!({"to": "0xabc", "value": "0x1"})];
        assert_eq!(canonical_params("eth_sendTransaction", params.clone()), params);
        assert_eq!(canonical_params("sol_getAccounts", vec![json!(1)]), vec![json!(1)]);
        assert_eq!(canonical_params("cosmos_getKey", vec![json!("osmosis-1")]), vec![json!("osmosis-1")]);
    }

    #[test]
    fn truthiness_matches_javascript() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }
}

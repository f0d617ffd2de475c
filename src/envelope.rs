//! Request envelope: the record handed to the wallet inside the deep link.

use crate::canonical::CONNECT_METHOD;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Characters `encodeURIComponent` leaves alone besides alphanumerics.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// `encodeURI` additionally keeps the URI reserved characters.
const URI: &AsciiSet = &COMPONENT
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'#');

pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

pub fn encode_uri(input: &str) -> String {
    utf8_percent_encode(input, URI).to_string()
}

/// One outbound call. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub method: String,
    pub params: Vec<Value>,
    pub id: String,
    pub app_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub redirect: String,
}

impl RequestEnvelope {
    /// The access token only travels with `connect`.
    pub fn new(
        id: String,
        method: impl Into<String>,
        params: Vec<Value>,
        app_id: impl Into<String>,
        chain: Option<String>,
        access_token: Option<String>,
        redirect_target: &str,
    ) -> Self {
        let method = method.into();
        let access_token = access_token.filter(|_| method == CONNECT_METHOD);
        Self {
            method,
            params,
            id,
            app_id: app_id.into(),
            chain,
            access_token,
            redirect: encode_uri(redirect_target),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// JSON, percent-encoded as a single URL component.
    pub fn encoded(&self) -> serde_json::Result<String> {
        Ok(encode_component(&self.to_json()?))
    }
}

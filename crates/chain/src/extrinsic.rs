//! Extrinsic encoding and local sr25519 signing.
//!
//! The gateway supplies the SCALE-encoded call and the signed-extension
//! bytes. The signature is produced in this process and only the finished
//! extrinsic goes back over the wire; secret URIs are never transmitted.

use parity_scale_codec::{Compact, Encode};
use serde::{Deserialize, Serialize};
use sp_core::{sr25519, Pair as _};
use sp_crypto_hashing::blake2_256;
use std::fmt;

use crate::error::{ChainError, Result};
use crate::types::{hex_bytes, AccountId, Call, H256};

const EXTRINSIC_VERSION: u8 = 4;
const SIGNED_BIT: u8 = 0b1000_0000;
/// `MultiAddress::Id`
const ADDRESS_ID: u8 = 0;
/// `MultiSignature::Sr25519`
const SIGNATURE_SR25519: u8 = 1;
/// Longer signing payloads are signed by their blake2-256 hash.
const MAX_UNHASHED_PAYLOAD: usize = 256;

/// sr25519 key of the signing (proxy) account.
#[derive(Clone)]
pub struct KeyPair {
    pair: sr25519::Pair,
    account: AccountId,
}

impl KeyPair {
    /// Derive from a secret URI: `<mnemonic or 0x seed>[//hard][/soft][///password]`.
    /// A bare path such as `//Alice` derives from the development phrase.
    pub fn from_uri(suri: &str) -> Result<Self> {
        let pair = sr25519::Pair::from_string(suri, None)
            .map_err(|e| ChainError::InvalidKey(format!("{e:?}")))?;
        let account = AccountId::from_public(pair.public().0);
        Ok(Self { pair, account })
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.pair.sign(message).0
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

/// Chain state a signature commits to, for the next extrinsic of one signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningParams {
    pub nonce: u64,
    /// Encoded signed extensions (era, nonce, tip), included in the extrinsic
    #[serde(with = "hex_bytes")]
    pub extra: Vec<u8>,
    /// Implicit data (spec version, genesis hash, ...), signed but not included
    #[serde(with = "hex_bytes")]
    pub additional: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBy {
    pub signer: AccountId,
    pub nonce: u64,
}

/// Encoded extrinsic (version 4), ready for `author_submitExtrinsic`.
#[derive(Clone, PartialEq, Eq)]
pub struct Extrinsic {
    call: Call,
    signed: Option<SignedBy>,
    encoded: Vec<u8>,
}

impl Extrinsic {
    pub fn unsigned(call: Call, call_data: &[u8]) -> Self {
        let mut body = Vec::with_capacity(1 + call_data.len());
        body.push(EXTRINSIC_VERSION);
        body.extend_from_slice(call_data);
        Self { call, signed: None, encoded: length_prefixed(body) }
    }

    /// Sign `call_data` with `key` and assemble the signed extrinsic.
    pub fn signed(call: Call, call_data: &[u8], key: &KeyPair, params: &SigningParams) -> Self {
        let signature = key.sign(&signing_payload(call_data, params));

        let mut body = Vec::with_capacity(99 + params.extra.len() + call_data.len());
        body.push(EXTRINSIC_VERSION | SIGNED_BIT);
        body.push(ADDRESS_ID);
        body.extend_from_slice(key.account().as_bytes());
        body.push(SIGNATURE_SR25519);
        body.extend_from_slice(&signature);
        body.extend_from_slice(&params.extra);
        body.extend_from_slice(call_data);

        Self {
            call,
            signed: Some(SignedBy { signer: key.account().clone(), nonce: params.nonce }),
            encoded: length_prefixed(body),
        }
    }

    pub fn call(&self) -> &Call {
        &self.call
    }

    pub fn is_signed(&self) -> bool {
        self.signed.is_some()
    }

    pub fn signer(&self) -> Option<&AccountId> {
        self.signed.as_ref().map(|s| &s.signer)
    }

    pub fn nonce(&self) -> Option<u64> {
        self.signed.as_ref().map(|s| s.nonce)
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.encoded))
    }

    /// Extrinsic hash, as the node reports it.
    pub fn hash(&self) -> H256 {
        H256(blake2_256(&self.encoded))
    }
}

impl fmt::Debug for Extrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extrinsic")
            .field("method", &self.call.method())
            .field("signed", &self.signed)
            .field("hash", &self.hash())
            .finish()
    }
}

fn signing_payload(call_data: &[u8], params: &SigningParams) -> Vec<u8> {
    let payload = [call_data, &params.extra, &params.additional].concat();
    if payload.len() > MAX_UNHASHED_PAYLOAD {
        blake2_256(&payload).to_vec()
    } else {
        payload
    }
}

fn length_prefixed(body: Vec<u8>) -> Vec<u8> {
    let mut encoded = Compact(body.len() as u32).encode();
    encoded.extend(body);
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuctionId;
    use parity_scale_codec::Decode;

    const ALICE_PUBLIC: &str = "d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

    fn params() -> SigningParams {
        SigningParams { nonce: 3, extra: vec![0x00, 0x0c, 0x00], additional: vec![0xaa; 40] }
    }

    fn call() -> Call {
        Call::Bid { id: AuctionId(1), value: 5 }
    }

    /// Strip the compact length prefix, checking it matches.
    fn body(encoded: &[u8]) -> &[u8] {
        let mut input = encoded;
        let len = Compact::<u32>::decode(&mut input).unwrap().0;
        assert_eq!(len as usize, input.len());
        input
    }

    fn verify(key: &KeyPair, signature: &[u8], message: &[u8]) -> bool {
        let signature = sr25519::Signature::from_raw(signature.try_into().unwrap());
        sr25519::Pair::verify(&signature, message, &key.pair.public())
    }

    #[test]
    fn test_key_from_dev_uri() {
        let key = KeyPair::from_uri("//Alice").unwrap();
        assert_eq!(hex::encode(key.account().as_bytes()), ALICE_PUBLIC);
        assert_ne!(KeyPair::from_uri("//Proxy").unwrap().account(), key.account());
        assert!(KeyPair::from_uri("definitely not a mnemonic").is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let suri = "bottom drive obey lake curtain smoke basket hold race lonely fit walk//Proxy";
        let key = KeyPair::from_uri(suri).unwrap();
        let debug = format!("{key:?}");
        assert!(!debug.contains("bottom drive"));
        assert!(!debug.contains("//Proxy"));
        assert!(debug.contains(&key.account().to_string()));
    }

    #[test]
    fn test_unsigned_layout() {
        let xt = Extrinsic::unsigned(call(), &[0x06, 0x02]);
        assert_eq!(xt.encoded(), &[0x0c, 0x04, 0x06, 0x02]);
        assert!(!xt.is_signed());
        assert_eq!(xt.nonce(), None);
        assert_eq!(xt.to_hex(), "0x0c040602");
    }

    #[test]
    fn test_signed_layout_and_signature() {
        let key = KeyPair::from_uri("//Proxy").unwrap();
        let call_data = [0x28, 0x01, 0x02];
        let xt = Extrinsic::signed(call(), &call_data, &key, &params());

        let body = body(xt.encoded());
        assert_eq!(body[0], 0x84);
        assert_eq!(body[1], ADDRESS_ID);
        assert_eq!(&body[2..34], key.account().as_bytes());
        assert_eq!(body[34], SIGNATURE_SR25519);
        assert_eq!(&body[99..102], &params().extra[..]);
        assert_eq!(&body[102..], &call_data);

        let message = [&call_data[..], &params().extra, &params().additional].concat();
        assert!(verify(&key, &body[35..99], &message));
        assert_eq!(xt.signer(), Some(key.account()));
        assert_eq!(xt.nonce(), Some(3));
        assert_eq!(xt.hash(), H256(blake2_256(xt.encoded())));
    }

    #[test]
    fn test_long_payload_signed_by_hash() {
        let key = KeyPair::from_uri("//Proxy").unwrap();
        let call_data = vec![0x11; 300];
        let xt = Extrinsic::signed(call(), &call_data, &key, &params());

        let body = body(xt.encoded());
        let message = [&call_data[..], &params().extra, &params().additional].concat();
        assert!(verify(&key, &body[35..99], &blake2_256(&message)));
        assert!(!verify(&key, &body[35..99], &message));
    }
}

//! EIP-712 typed-data construction for exchange orders.
//!
//! The domain's verifying contract is selected by the market's neg-risk
//! flag: standard markets verify against the CTF Exchange, neg-risk
//! markets against the Neg Risk CTF Exchange. The flag used here must be
//! the one the order was built with — a mismatch signs a syntactically
//! valid order for the wrong contract, so it is rejected up front.
//!
//! Order struct layout matches OrderStructs.sol in Polymarket's
//! ctf-exchange repository.

use alloy::primitives::{address, keccak256, Address, B256, U256};
use serde::Serialize;

use super::{OrderError, UnsignedOrder};

pub const DOMAIN_NAME: &str = "Polymarket CTF Exchange";
pub const DOMAIN_VERSION: &str = "1";

/// CTF Exchange (Polygon mainnet).
pub const CTF_EXCHANGE: Address = address!("4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E");
/// Neg Risk CTF Exchange (Polygon mainnet).
pub const NEG_RISK_CTF_EXCHANGE: Address = address!("C5d563A36AE78145C45a50134d48A1215220f80a");

const ORDER_TYPEHASH_STR: &[u8] = b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)";

const DOMAIN_TYPEHASH_STR: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Which exchange contract verifies an order's signature.
pub fn verifying_contract(neg_risk: bool) -> Address {
    if neg_risk {
        NEG_RISK_CTF_EXCHANGE
    } else {
        CTF_EXCHANGE
    }
}

/// Payload shaped for `eth_signTypedData_v4`: domain, type table, and the
/// order message with every uint as a decimal string.
#[derive(Debug, Clone, Serialize)]
pub struct TypedOrderData {
    pub types: TypedDataTypes,
    #[serde(rename = "primaryType")]
    pub primary_type: String,
    pub domain: TypedDataDomain,
    pub message: OrderMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypedDataTypes {
    #[serde(rename = "EIP712Domain")]
    pub eip712_domain: Vec<TypeField>,
    #[serde(rename = "Order")]
    pub order: Vec<TypeField>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub type_name: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMessage {
    pub salt: String,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub side: u8,
    pub signature_type: u8,
}

fn type_table() -> TypedDataTypes {
    TypedDataTypes {
        eip712_domain: vec![
            TypeField { name: "name", type_name: "string" },
            TypeField { name: "version", type_name: "string" },
            TypeField { name: "chainId", type_name: "uint256" },
            TypeField { name: "verifyingContract", type_name: "address" },
        ],
        order: vec![
            TypeField { name: "salt", type_name: "uint256" },
            TypeField { name: "maker", type_name: "address" },
            TypeField { name: "signer", type_name: "address" },
            TypeField { name: "taker", type_name: "address" },
            TypeField { name: "tokenId", type_name: "uint256" },
            TypeField { name: "makerAmount", type_name: "uint256" },
            TypeField { name: "takerAmount", type_name: "uint256" },
            TypeField { name: "expiration", type_name: "uint256" },
            TypeField { name: "nonce", type_name: "uint256" },
            TypeField { name: "feeRateBps", type_name: "uint256" },
            TypeField { name: "side", type_name: "uint8" },
            TypeField { name: "signatureType", type_name: "uint8" },
        ],
    }
}

/// Build the structured signing payload for an order.
///
/// `neg_risk` must equal the flag the order was built with; the two feed
/// the same leg and may never diverge.
pub fn order_typed_data(
    order: &UnsignedOrder,
    neg_risk: bool,
    chain_id: u64,
) -> Result<TypedOrderData, OrderError> {
    if neg_risk != order.neg_risk {
        return Err(OrderError::NegRiskMismatch {
            requested: neg_risk,
            built: order.neg_risk,
        });
    }

    Ok(TypedOrderData {
        types: type_table(),
        primary_type: "Order".to_string(),
        domain: TypedDataDomain {
            name: DOMAIN_NAME.to_string(),
            version: DOMAIN_VERSION.to_string(),
            chain_id,
            verifying_contract: format!("{:?}", verifying_contract(neg_risk)),
        },
        message: OrderMessage {
            salt: order.salt.to_string(),
            maker: format!("{:?}", order.maker),
            signer: format!("{:?}", order.signer),
            taker: format!("{:?}", order.taker),
            token_id: order.token_id.to_string(),
            maker_amount: order.maker_amount.to_string(),
            taker_amount: order.taker_amount.to_string(),
            expiration: order.expiration.to_string(),
            nonce: order.nonce.to_string(),
            fee_rate_bps: order.fee_rate_bps.to_string(),
            side: order.side.as_u8(),
            signature_type: order.signature_type.as_u8(),
        },
    })
}

fn encode_address(out: &mut Vec<u8>, addr: Address) {
    let mut padded = [0u8; 32];
    padded[12..].copy_from_slice(addr.as_slice());
    out.extend_from_slice(&padded);
}

fn encode_u256(out: &mut Vec<u8>, value: U256) {
    out.extend_from_slice(&value.to_be_bytes::<32>());
}

/// keccak256(abi.encode(domain typehash, name, version, chainId, contract)).
pub fn domain_separator(neg_risk: bool, chain_id: u64) -> B256 {
    let mut encoded = Vec::with_capacity(160);
    encoded.extend_from_slice(keccak256(DOMAIN_TYPEHASH_STR).as_slice());
    encoded.extend_from_slice(keccak256(DOMAIN_NAME.as_bytes()).as_slice());
    encoded.extend_from_slice(keccak256(DOMAIN_VERSION.as_bytes()).as_slice());
    encode_u256(&mut encoded, U256::from(chain_id));
    encode_address(&mut encoded, verifying_contract(neg_risk));
    keccak256(&encoded)
}

/// EIP-712 struct hash of the order message.
fn order_struct_hash(order: &UnsignedOrder) -> B256 {
    let mut encoded = Vec::with_capacity(13 * 32);
    encoded.extend_from_slice(keccak256(ORDER_TYPEHASH_STR).as_slice());
    encode_u256(&mut encoded, U256::from(order.salt));
    encode_address(&mut encoded, order.maker);
    encode_address(&mut encoded, order.signer);
    encode_address(&mut encoded, order.taker);
    encode_u256(&mut encoded, order.token_id);
    encode_u256(&mut encoded, order.maker_amount);
    encode_u256(&mut encoded, order.taker_amount);
    encode_u256(&mut encoded, U256::from(order.expiration));
    encode_u256(&mut encoded, U256::from(order.nonce));
    encode_u256(&mut encoded, U256::from(order.fee_rate_bps));
    encode_u256(&mut encoded, U256::from(order.side.as_u8()));
    encode_u256(&mut encoded, U256::from(order.signature_type.as_u8()));
    keccak256(&encoded)
}

/// Final digest a wallet signs: keccak256(0x1901 ‖ domain ‖ struct hash).
/// The domain is taken from the order's own neg-risk flag, so the digest
/// can never disagree with the contract the order was built for.
pub fn signing_digest(order: &UnsignedOrder, chain_id: u64) -> B256 {
    let mut encoded = Vec::with_capacity(66);
    encoded.extend_from_slice(&[0x19, 0x01]);
    encoded.extend_from_slice(domain_separator(order.neg_risk, chain_id).as_slice());
    encoded.extend_from_slice(order_struct_hash(order).as_slice());
    keccak256(&encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{build_order, BuildOrderParams, OrderSide};
    use rust_decimal_macros::dec;

    fn order(neg_risk: bool) -> UnsignedOrder {
        build_order(&BuildOrderParams {
            maker: Address::repeat_byte(0x22),
            signer: Address::repeat_byte(0x22),
            token_id: "42".to_string(),
            side: OrderSide::Buy,
            price_per_share: dec!(0.40),
            size_usd: dec!(10),
            neg_risk,
            tick_size: dec!(0.01),
            is_proxy: false,
        })
        .unwrap()
    }

    #[test]
    fn verifying_contract_follows_neg_risk() {
        assert_eq!(verifying_contract(false), CTF_EXCHANGE);
        assert_eq!(verifying_contract(true), NEG_RISK_CTF_EXCHANGE);

        let typed = order_typed_data(&order(true), true, 137).unwrap();
        assert_eq!(
            typed.domain.verifying_contract.to_lowercase(),
            format!("{:?}", NEG_RISK_CTF_EXCHANGE).to_lowercase()
        );
    }

    #[test]
    fn neg_risk_mismatch_is_rejected() {
        let built = order(true);
        let err = order_typed_data(&built, false, 137).unwrap_err();
        assert!(matches!(
            err,
            OrderError::NegRiskMismatch {
                requested: false,
                built: true
            }
        ));
    }

    #[test]
    fn message_fields_are_decimal_strings() {
        let typed = order_typed_data(&order(false), false, 137).unwrap();
        assert_eq!(typed.primary_type, "Order");
        assert_eq!(typed.message.maker_amount, "10000000");
        assert_eq!(typed.message.taker_amount, "25000000");
        assert_eq!(typed.message.side, 0);
        assert_eq!(typed.domain.chain_id, 137);

        let json = serde_json::to_value(&typed).unwrap();
        assert!(json["types"]["Order"].is_array());
        assert_eq!(json["message"]["feeRateBps"], "0");
    }

    #[test]
    fn digest_depends_on_verifying_contract() {
        let mut standard = order(false);
        let mut neg = standard.clone();
        neg.neg_risk = true;
        // Same salt/fields, different domain → different digest.
        standard.salt = 7;
        neg.salt = 7;
        assert_ne!(signing_digest(&standard, 137), signing_digest(&neg, 137));
    }

    #[test]
    fn domain_separator_is_chain_scoped() {
        assert_ne!(domain_separator(false, 137), domain_separator(false, 80002));
    }
}

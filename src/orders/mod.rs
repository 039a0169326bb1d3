//! Order construction for the CTF exchange.
//!
//! Turns a leg's (token, side, price, size) into the canonical unsigned
//! order structure the exchange verifies. Amounts are computed in raw
//! 6-decimal collateral/outcome-token units, with the price snapped to
//! the market's tick size first. Every order gets a fresh random salt so
//! signatures cannot be replayed.

pub mod typed_data;

use alloy::primitives::{Address, U256};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

/// Raw unit scale shared by collateral and outcome tokens.
const UNIT_SCALE: u32 = 6;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("price {price} must be strictly between 0 and 1")]
    PriceOutOfRange { price: Decimal },
    #[error("order size must be positive, got {size}")]
    NonPositiveSize { size: Decimal },
    #[error("tick size {tick} is not a valid price increment")]
    InvalidTick { tick: Decimal },
    #[error("amount {amount} does not fit in raw units")]
    AmountOverflow { amount: Decimal },
    #[error("token id {token_id:?} is not a decimal uint256")]
    BadTokenId { token_id: String },
    #[error("typed data requested with neg_risk={requested} but the order was built with neg_risk={built}")]
    NegRiskMismatch { requested: bool, built: bool },
}

/// Exchange-level order side. A YES or NO parlay leg is always a BUY of
/// the selected outcome token; SELL exists for closing positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_u8(self) -> u8 {
        match self {
            OrderSide::Buy => 0,
            OrderSide::Sell => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// EIP-712 signature scheme tag: 0 = EOA, 1 = proxy wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    Eoa,
    PolyProxy,
}

impl SignatureType {
    pub fn as_u8(self) -> u8 {
        match self {
            SignatureType::Eoa => 0,
            SignatureType::PolyProxy => 1,
        }
    }
}

/// Everything the builder needs for one leg.
#[derive(Debug, Clone)]
pub struct BuildOrderParams {
    pub maker: Address,
    pub signer: Address,
    /// Outcome token id as the decimal string the CLOB uses.
    pub token_id: String,
    pub side: OrderSide,
    pub price_per_share: Decimal,
    pub size_usd: Decimal,
    pub neg_risk: bool,
    pub tick_size: Decimal,
    pub is_proxy: bool,
}

/// Canonical unsigned order. Computed fresh per leg at signing time and
/// never reused; each leg has its own token, amounts, and salt.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedOrder {
    pub salt: u64,
    pub maker: Address,
    pub signer: Address,
    /// Zero for public orders.
    pub taker: Address,
    pub token_id: U256,
    pub maker_amount: U256,
    pub taker_amount: U256,
    /// 0 = good-till-cancelled.
    pub expiration: u64,
    pub nonce: u64,
    pub fee_rate_bps: u64,
    pub side: OrderSide,
    pub signature_type: SignatureType,
    /// Which exchange contract verifies this order. Not part of the wire
    /// message; carried so typed-data construction can be cross-checked.
    pub neg_risk: bool,
}

/// Unsigned order plus its signature. Write-once: transmitted in the
/// batch submit and tracked afterwards only via LegStatus.
#[derive(Debug, Clone)]
pub struct SignedOrder {
    pub order: UnsignedOrder,
    /// 0x-prefixed hex signature bytes.
    pub signature: String,
}

impl SignedOrder {
    pub fn wire(&self) -> WireOrder {
        WireOrder::from_signed(self)
    }
}

/// Exchange wire shape for a signed order: every uint as a decimal
/// string, addresses 0x-hex, side as BUY/SELL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOrder {
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
    pub side: String,
    pub signature_type: u8,
    pub signature: String,
}

impl WireOrder {
    fn from_signed(signed: &SignedOrder) -> Self {
        let o = &signed.order;
        Self {
            salt: o.salt.to_string(),
            maker: format!("{:?}", o.maker),
            signer: format!("{:?}", o.signer),
            taker: format!("{:?}", o.taker),
            token_id: o.token_id.to_string(),
            maker_amount: o.maker_amount.to_string(),
            taker_amount: o.taker_amount.to_string(),
            expiration: o.expiration.to_string(),
            nonce: o.nonce.to_string(),
            fee_rate_bps: o.fee_rate_bps.to_string(),
            side: o.side.as_str().to_string(),
            signature_type: o.signature_type.as_u8(),
            signature: signed.signature.clone(),
        }
    }
}

/// Snap a price onto the market's tick grid.
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Result<Decimal, OrderError> {
    if tick <= Decimal::ZERO || tick >= Decimal::ONE {
        return Err(OrderError::InvalidTick { tick });
    }
    let ticks = (price / tick).round();
    Ok(ticks * tick)
}

/// Convert a USDC/share amount to raw 6-decimal units.
fn to_units(amount: Decimal) -> Result<U256, OrderError> {
    let scaled = (amount * Decimal::from(10u64.pow(UNIT_SCALE))).round();
    let raw = scaled
        .to_u128()
        .ok_or(OrderError::AmountOverflow { amount })?;
    Ok(U256::from(raw))
}

/// Build the canonical unsigned order for one leg.
///
/// BUY: maker amount is collateral spent, taker amount is the shares
/// received (size / price). SELL is the mirror. Shares are truncated to
/// the tick's precision so the exchange accepts the amounts.
pub fn build_order(params: &BuildOrderParams) -> Result<UnsignedOrder, OrderError> {
    if params.price_per_share <= Decimal::ZERO || params.price_per_share >= Decimal::ONE {
        return Err(OrderError::PriceOutOfRange {
            price: params.price_per_share,
        });
    }
    if params.size_usd <= Decimal::ZERO {
        return Err(OrderError::NonPositiveSize {
            size: params.size_usd,
        });
    }

    let price = round_to_tick(params.price_per_share, params.tick_size)?;
    if price <= Decimal::ZERO || price >= Decimal::ONE {
        return Err(OrderError::PriceOutOfRange { price });
    }

    let shares = (params.size_usd / price)
        .round_dp_with_strategy(params.tick_size.scale(), RoundingStrategy::ToZero);
    let collateral = shares * price;

    let (maker_amount, taker_amount) = match params.side {
        OrderSide::Buy => (to_units(collateral)?, to_units(shares)?),
        OrderSide::Sell => (to_units(shares)?, to_units(collateral)?),
    };

    let token_id =
        U256::from_str_radix(&params.token_id, 10).map_err(|_| OrderError::BadTokenId {
            token_id: params.token_id.clone(),
        })?;

    Ok(UnsignedOrder {
        salt: rand::thread_rng().gen::<u64>(),
        maker: params.maker,
        signer: params.signer,
        taker: Address::ZERO,
        token_id,
        maker_amount,
        taker_amount,
        expiration: 0,
        nonce: 0,
        fee_rate_bps: 0,
        side: params.side,
        signature_type: if params.is_proxy {
            SignatureType::PolyProxy
        } else {
            SignatureType::Eoa
        },
        neg_risk: params.neg_risk,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params(price: Decimal, size: Decimal, tick: Decimal) -> BuildOrderParams {
        BuildOrderParams {
            maker: Address::repeat_byte(0x11),
            signer: Address::repeat_byte(0x11),
            token_id: "123456789".to_string(),
            side: OrderSide::Buy,
            price_per_share: price,
            size_usd: size,
            neg_risk: false,
            tick_size: tick,
            is_proxy: false,
        }
    }

    #[test]
    fn buy_amounts_scale_to_six_decimals() {
        // $10 at 0.40 → 25 shares, $10 collateral.
        let order = build_order(&params(dec!(0.40), dec!(10), dec!(0.01))).unwrap();
        assert_eq!(order.maker_amount, U256::from(10_000_000u64));
        assert_eq!(order.taker_amount, U256::from(25_000_000u64));
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.taker, Address::ZERO);
    }

    #[test]
    fn sell_mirrors_buy_amounts() {
        let mut p = params(dec!(0.40), dec!(10), dec!(0.01));
        p.side = OrderSide::Sell;
        let order = build_order(&p).unwrap();
        assert_eq!(order.maker_amount, U256::from(25_000_000u64));
        assert_eq!(order.taker_amount, U256::from(10_000_000u64));
    }

    #[test]
    fn price_snaps_to_tick_before_amounts() {
        // 0.4013 on a 0.01 grid → 0.40.
        let order = build_order(&params(dec!(0.4013), dec!(10), dec!(0.01))).unwrap();
        assert_eq!(order.maker_amount, U256::from(10_000_000u64));
        assert_eq!(order.taker_amount, U256::from(25_000_000u64));
    }

    #[test]
    fn shares_truncate_at_tick_precision() {
        // $10 / 0.30 = 33.333... → 33.3 shares on a 0.1 grid, $9.99 spent.
        let order = build_order(&params(dec!(0.30), dec!(10), dec!(0.1))).unwrap();
        assert_eq!(order.taker_amount, U256::from(33_300_000u64));
        assert_eq!(order.maker_amount, U256::from(9_990_000u64));
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(matches!(
            build_order(&params(dec!(1.2), dec!(10), dec!(0.01))),
            Err(OrderError::PriceOutOfRange { .. })
        ));
        assert!(matches!(
            build_order(&params(dec!(0.5), dec!(0), dec!(0.01))),
            Err(OrderError::NonPositiveSize { .. })
        ));
        assert!(matches!(
            build_order(&params(dec!(0.5), dec!(10), dec!(0))),
            Err(OrderError::InvalidTick { .. })
        ));
    }

    #[test]
    fn salts_differ_between_orders() {
        let p = params(dec!(0.40), dec!(10), dec!(0.01));
        let a = build_order(&p).unwrap();
        let b = build_order(&p).unwrap();
        assert_ne!(a.salt, b.salt);
    }

    #[test]
    fn wire_shape_uses_strings_and_buy_sell() {
        let order = build_order(&params(dec!(0.40), dec!(10), dec!(0.01))).unwrap();
        let signed = SignedOrder {
            order,
            signature: "0xdeadbeef".to_string(),
        };
        let wire = signed.wire();
        assert_eq!(wire.side, "BUY");
        assert_eq!(wire.maker_amount, "10000000");
        assert_eq!(wire.token_id, "123456789");
        assert!(wire.maker.starts_with("0x"));

        let json = serde_json::to_value(&wire).unwrap();
        assert!(json.get("makerAmount").is_some());
        assert!(json.get("signatureType").is_some());
    }
}

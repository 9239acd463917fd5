//! Order request validation and normalization
//!
//! Every check runs and every failure is reported, so a client sees the
//! full list of problems at once. Funds are checked last, and only for a
//! request that is otherwise well formed.

use crate::market_data::MarketDataStore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use types::errors::{AccountError, ValidationError};
use types::ids::{AccountId, InstrumentId, OrderId};
use types::numeric::{NumericError, Price, Quantity};
use types::order::{Order, OrderRequest, OrderType, Side, TimeInForce};

/// Validation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub min_quantity: Decimal,
    pub max_quantity: Decimal,
    /// Prices are rounded to a multiple of this
    pub tick_size: Decimal,
    /// Quantities are truncated to this many decimal places
    pub lot_decimals: u32,
    /// Max relative distance of a limit price from the last price
    pub price_band: Decimal,
    /// Headroom over the last price when reserving cash for a market buy
    pub market_buy_buffer: Decimal,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_quantity: Decimal::new(1, 4),
            max_quantity: Decimal::from(1_000_000),
            tick_size: Decimal::new(1, 2),
            lot_decimals: 4,
            price_band: Decimal::new(5, 1),
            market_buy_buffer: Decimal::new(5, 2),
        }
    }
}

/// What an order needs from its owner's balances
#[derive(Debug, Clone, PartialEq)]
pub struct FundsRequirement {
    pub owner_id: AccountId,
    pub symbol: InstrumentId,
    pub side: Side,
    pub quantity: Quantity,
    /// Cash for buys (notional plus taker fee), zero for sells
    pub cash: Decimal,
}

/// Balance check consulted at submission
///
/// `reserve` is the admission step: it must check and commit in one go so
/// that two orders from the same owner cannot both spend the same balance.
/// Implementations that track reservations free them when the order's
/// quantity is traded or the order ends, and on `release`.
pub trait FundsCheck: Send + Sync {
    fn check_funds(&self, requirement: &FundsRequirement) -> Result<(), AccountError>;

    fn reserve(&self, _order_id: OrderId, requirement: &FundsRequirement) -> Result<(), AccountError> {
        self.check_funds(requirement)
    }

    /// Drop whatever is still held for an order that never reached a book
    fn release(&self, _order_id: OrderId) {}
}

/// Accepts everything; for venues without balance tracking
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFundsCheck;

impl FundsCheck for NoFundsCheck {
    fn check_funds(&self, _requirement: &FundsRequirement) -> Result<(), AccountError> {
        Ok(())
    }
}

pub struct OrderValidator {
    config: ValidatorConfig,
    market_data: Arc<MarketDataStore>,
    funds: Arc<dyn FundsCheck>,
    taker_rate: Decimal,
}

impl OrderValidator {
    pub fn new(
        config: ValidatorConfig,
        market_data: Arc<MarketDataStore>,
        funds: Arc<dyn FundsCheck>,
        taker_rate: Decimal,
    ) -> Self {
        Self {
            config,
            market_data,
            funds,
            taker_rate,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate and normalize a request into a pending order
    pub fn validate(&self, request: OrderRequest, timestamp: i64) -> Result<Order, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut normalized = request;
        let type_name = format!("{:?}", normalized.order_type);

        // Quantity
        if normalized.quantity.is_zero() {
            errors.push(ValidationError::NonPositiveQuantity);
        } else {
            let lot = normalized.quantity.round_to_lot(self.config.lot_decimals);
            if lot.is_zero() {
                errors.push(ValidationError::QuantityRoundsToZero {
                    decimals: self.config.lot_decimals,
                });
            } else if lot.as_decimal() < self.config.min_quantity {
                errors.push(ValidationError::QuantityBelowMinimum {
                    quantity: lot.to_string(),
                    min: self.config.min_quantity.to_string(),
                });
            } else if lot.as_decimal() > self.config.max_quantity {
                errors.push(ValidationError::QuantityAboveMaximum {
                    quantity: lot.to_string(),
                    max: self.config.max_quantity.to_string(),
                });
            }
            normalized.quantity = lot;
        }

        // Prices required or forbidden by the order type
        let order_type = normalized.order_type;
        match (order_type.requires_limit_price(), normalized.limit_price) {
            (true, None) => errors.push(ValidationError::MissingLimitPrice {
                order_type: type_name.clone(),
            }),
            (false, Some(_)) => errors.push(ValidationError::UnexpectedLimitPrice {
                order_type: type_name.clone(),
            }),
            _ => {}
        }
        match (order_type.requires_stop_price(), normalized.stop_price) {
            (true, None) => errors.push(ValidationError::MissingStopPrice {
                order_type: type_name.clone(),
            }),
            (false, Some(_)) => errors.push(ValidationError::UnexpectedStopPrice {
                order_type: type_name.clone(),
            }),
            _ => {}
        }

        // Tick normalization
        normalized.limit_price = normalized.limit_price.and_then(|p| self.round_price(p, &mut errors));
        normalized.stop_price = normalized.stop_price.and_then(|p| self.round_price(p, &mut errors));

        // Market data and price band, for the limit and the stop price alike
        let last_price = self.market_data.last_price(&normalized.symbol);
        match last_price {
            None => errors.push(ValidationError::NoMarketData {
                symbol: normalized.symbol.to_string(),
            }),
            Some(last) => {
                for price in [normalized.limit_price, normalized.stop_price].into_iter().flatten() {
                    self.check_band(price, last, &mut errors);
                }
            }
        }

        // Market orders never rest
        if order_type == OrderType::Market && normalized.time_in_force.allows_resting() {
            normalized.time_in_force = TimeInForce::IOC;
        }

        if !errors.is_empty() {
            debug!(symbol = %normalized.symbol, owner = %normalized.owner_id, count = errors.len(), "order request rejected");
            return Err(errors);
        }

        let Some(last) = last_price else {
            return Err(errors);
        };
        let requirement = self.funds_requirement(&normalized, last).map_err(|e| vec![e])?;
        let order = Order::from_request(normalized, timestamp);
        if let Err(e) = self.funds.reserve(order.order_id, &requirement) {
            debug!(symbol = %order.symbol, owner = %order.owner_id, error = %e, "funds check failed");
            return Err(vec![ValidationError::Account(e)]);
        }
        Ok(order)
    }

    /// Return an admitted order's reservation when matching refused it
    pub fn release(&self, order_id: OrderId) {
        self.funds.release(order_id);
    }

    fn round_price(&self, price: Price, errors: &mut Vec<ValidationError>) -> Option<Price> {
        match price.round_to_tick(self.config.tick_size) {
            Ok(rounded) => Some(rounded),
            Err(NumericError::Overflow(_)) => {
                errors.push(ValidationError::PriceOutOfRange {
                    price: price.to_string(),
                });
                None
            }
            Err(_) => {
                errors.push(ValidationError::PriceRoundsToZero {
                    tick: self.config.tick_size.to_string(),
                });
                None
            }
        }
    }

    fn check_band(&self, price: Price, last: Price, errors: &mut Vec<ValidationError>) {
        let band = last.as_decimal().checked_mul(self.config.price_band);
        let bounds = band.and_then(|b| Some((last.as_decimal().checked_sub(b)?, last.as_decimal().checked_add(b)?)));
        let Some((low, high)) = bounds else {
            errors.push(ValidationError::PriceOutOfRange {
                price: last.to_string(),
            });
            return;
        };
        if price.as_decimal() < low || price.as_decimal() > high {
            errors.push(ValidationError::PriceOutsideBand {
                price: price.to_string(),
                low: low.to_string(),
                high: high.to_string(),
            });
        }
    }

    /// Cash a buy must cover: quantity × reference price × (1 + taker rate)
    ///
    /// The reference is the limit price when there is one, the stop price
    /// for stop-market orders, and the last price plus buffer for market
    /// orders.
    fn funds_requirement(&self, request: &OrderRequest, last: Price) -> Result<FundsRequirement, ValidationError> {
        let cash = match request.side {
            Side::Sell => Decimal::ZERO,
            Side::Buy => {
                let reference = match request.limit_price.or(request.stop_price) {
                    Some(price) => price.as_decimal(),
                    None => last
                        .as_decimal()
                        .checked_mul(Decimal::ONE + self.config.market_buy_buffer)
                        .ok_or_else(|| ValidationError::PriceOutOfRange {
                            price: last.to_string(),
                        })?,
                };
                request
                    .quantity
                    .as_decimal()
                    .checked_mul(reference)
                    .and_then(|notional| notional.checked_mul(Decimal::ONE + self.taker_rate))
                    .ok_or_else(|| ValidationError::PriceOutOfRange {
                        price: reference.to_string(),
                    })?
            }
        };
        Ok(FundsRequirement {
            owner_id: request.owner_id,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            cash,
        })
    }
}

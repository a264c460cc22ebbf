mod money;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{Money, MoneyConversionError, BAKERY_CURRENCY_CODE};
pub use secret::Secret;

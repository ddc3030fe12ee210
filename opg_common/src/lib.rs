mod minor_units;

pub mod helpers;
pub mod op;
mod secret;

pub use minor_units::{MinorUnits, MinorUnitsConversionError, AMOUNT_TOLERANCE};
pub use secret::Secret;

//! The built-in binding provider variants.
//!
//! | variant                  | parameter types                                   |
//! |--------------------------|---------------------------------------------------|
//! | [`InputBinder`]          | the produced `T`, or one registered conversion    |
//! | [`StreamBinder`]         | read/write streams and their text/byte views      |
//! | [`CollectorBinder`]      | `Collector<T>`, `Out<T>`, `Out<Vec<T>>`           |
//! | [`TriggerAdapter`]       | the trigger payload `P`, or one conversion of it  |
//! | [`ValueProviderBinder`]  | `T`, `Out<T>`, the provider itself                |
//!
//! Every variant declines a parameter it cannot serve with `Ok(None)`.

mod collector;
mod input;
mod stream;
mod trigger;
mod value;

pub use collector::{CollectorBinder, ItemTypes};
pub use input::InputBinder;
pub use stream::{ACCESS_PROPERTY, StreamBinder};
pub use trigger::TriggerAdapter;
pub use value::ValueProviderBinder;

use weld_core::TypeKey;

use crate::converter::{Conversion, ConverterManager};

/// Finds a registered conversion from a fixed produced type to `requested`.
pub(crate) fn chain_conversion(
    produced: Option<TypeKey>,
    requested: TypeKey,
    converters: &ConverterManager,
) -> Option<(TypeKey, Conversion)> {
    let produced = produced?;
    converters
        .lookup(produced, requested)
        .map(|conversion| (produced, conversion))
}

//! Test utilities for the state updated integration

#![allow(dead_code)]

mod test_hass;
mod time;

pub use test_hass::*;
pub use time::*;

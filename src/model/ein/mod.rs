//! Anonymised voter credentials ("EINs"): formatting, generation, and the
//! per-election credential history.

mod credential;
mod generator;
mod history;

pub use credential::{group_widths, normalize, Ein, ParseError, SEPARATOR};
pub use generator::{
    generate, generate_with, min_digits, random_ein, random_ein_with, EinError, MAX_DIGITS,
    MAX_DRAWS,
};
pub use history::{EinHistory, EinMap};

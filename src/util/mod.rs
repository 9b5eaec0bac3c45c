//! Text helpers for the terminal front-end.
//!
//! - **Highlighting**: byte ranges of search matches inside a field
//! - **Sanitizing**: stripping control characters from upstream text
//! - **Layout**: Unicode-aware truncation to a column budget

mod text;

pub use text::{highlight, match_ranges, strip_control_chars, truncate_to_width};

//! Text handling for digest messages: plain-text body extraction, section
//! segmentation, and paragraph extraction.
//!
//! The stages are pure functions over `&str`, applied in sequence by the
//! pipeline in `digestmerge-core`:
//! 1. [`plain_text_body`] reduces a raw message to its `text/plain` body
//! 2. [`segment`] splits the body into an ordered [`SectionMap`]
//! 3. [`extract_paragraphs`] turns each section block into content paragraphs

mod message;
mod paragraphs;
mod segment;

pub use message::{ParsedMessage, decode_text, plain_text_body};
pub use paragraphs::{
    HEADER_FIELDS, MIN_PARAGRAPH_CHARS, Rejection, classify, extract_paragraphs, split_paragraphs,
};
pub use segment::{
    DEFAULT_SECTION, SEPARATOR_MIN_RUN, SUBSECTION_SUFFIXES, SectionMap, is_main_header,
    is_pure_separator, is_subsection_header, segment,
};

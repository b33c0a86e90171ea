//! Pipeline stages for template filling and PDF conversion.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the converter can be swapped without touching the fill engine.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ package ──▶ xml ──▶ fields (+ signature) ──▶ package ──▶ convert
//! (magic)   (unzip)    (tree)   (Client:/Date:)          (rezip)     (soffice)
//! ```
//!
//! 1. [`input`]     — check the template exists and starts like a zip
//! 2. [`package`]   — read the DOCX parts, preserving archive order
//! 3. [`xml`]       — parse `word/document.xml` into an owned tree
//! 4. [`fields`]    — locate and fill the placeholder paragraphs
//! 5. [`signature`] — optionally embed a signature image beside the last date
//! 6. [`fill`]      — drive steps 1–5 on the blocking pool
//! 7. [`convert`]   — run the external converter with a timeout; the only
//!    stage with a subprocess
//!
//! [`scratch`] owns the per-request directory every stage writes into.

pub mod convert;
pub mod fields;
pub mod fill;
pub mod input;
pub mod package;
pub mod scratch;
pub mod signature;
pub mod xml;

//! Pipeline stages for capture and build.
//!
//! Each submodule owns one concern and is testable on its own. The two
//! orchestrators ([`crate::capture`] and [`crate::build`]) wire them together.
//!
//! ## Data Flow
//!
//! ```text
//! capture:  browser ──▶ store ◀── normalize (crop in place)
//!           (tab)       (page_0001.png …)
//!
//! build:    store ──▶ normalize ──▶ assemble ──▶ ocr ──▶ metadata
//!           (list)    (JPEG)        (lopdf)      (tool)  (Info dict)
//! ```
//!
//! 1. [`store`]     — page file naming, natural ordering, atomic writes
//! 2. [`browser`]   — the session trait, its Chromium implementation and the
//!    per-page URL locator
//! 3. [`normalize`] — whitespace crop and JPEG re-encode; CPU-bound, callers
//!    run it off the async runtime
//! 4. [`assemble`]  — one PDF page per image, no re-encoding
//! 5. [`ocr`]       — external text recognition; the only stage that spawns
//!    a process
//! 6. [`metadata`]  — title/author/subject/keywords in the Info dictionary

pub mod assemble;
pub mod browser;
pub mod metadata;
pub mod normalize;
pub mod ocr;
pub mod store;

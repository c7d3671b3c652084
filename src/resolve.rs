//! Stack attribution resolver
//!
//! Turns the raw stacks stored for a provenance key into the deduplicated
//! list of call sites the report prints. Only frames from application or
//! third-party dependency code are attribution-relevant; the capture shim's
//! own frames and runtime internals are filtered out. Each record then
//! contributes one representative frame, the call site one level above the
//! wrapper, and representatives are deduplicated across all records sharing
//! the key while preserving first-seen order.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::provenance::ProvenanceRecord;
use crate::stack::CapturedStack;

/// Origin of one raw frame line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Third-party dependency code (cargo registry or git checkout)
    Dependency,
    /// Application code (has a source path, not runtime-owned)
    Application,
    /// Velador's own capture machinery
    CaptureShim,
    /// Language runtime / standard library internals
    Runtime,
}

fn dependency_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[/\\]\.cargo[/\\](registry|git)[/\\]").expect("static pattern compiles")
    })
}

/// Classify one raw frame line by its origin.
pub fn classify_frame_line(line: &str) -> FrameClass {
    if dependency_pattern().is_match(line) {
        FrameClass::Dependency
    } else if line.contains("velador::") {
        FrameClass::CaptureShim
    } else if line.contains("/rustc/") || line.contains("\\rustc\\") {
        FrameClass::Runtime
    } else if line.contains('/') || line.contains('\\') {
        FrameClass::Application
    } else {
        FrameClass::Runtime
    }
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Index into the filtered frame list of the representative frame.
    /// The default (1, the second remaining frame) reflects "the call site
    /// one level above the wrapper".
    pub frame_offset: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self { frame_offset: 1 }
    }
}

/// Filters, selects, and deduplicates displayed stack lines. Never mutates
/// the store it reads from.
#[derive(Debug, Clone, Default)]
pub struct AttributionResolver {
    options: ResolverOptions,
}

impl AttributionResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    /// Attribution-relevant lines of one stack, in original order.
    pub fn filter_frames<'a>(&self, stack: &'a CapturedStack) -> Vec<&'a str> {
        stack
            .frames()
            .iter()
            .map(String::as_str)
            .filter(|line| {
                matches!(
                    classify_frame_line(line),
                    FrameClass::Dependency | FrameClass::Application
                )
            })
            .collect()
    }

    /// The single representative frame a record contributes, or `None` when
    /// the filtered stack is shorter than the configured offset.
    pub fn representative_frame(&self, stack: &CapturedStack) -> Option<String> {
        self.filter_frames(stack)
            .get(self.options.frame_offset)
            .map(|line| (*line).to_string())
    }

    /// Unique representative frames across all records under one key,
    /// first-seen order preserved.
    pub fn resolve(&self, records: &[ProvenanceRecord]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for record in records {
            if let Some(frame) = self.representative_frame(&record.stack) {
                if seen.insert(frame.clone()) {
                    unique.push(frame);
                }
            }
        }
        unique
    }

    /// The rendered attribution block for a key, or `None` on an attribution
    /// miss (no records, or none with a usable frame).
    pub fn attribution_block(&self, message: &str, records: &[ProvenanceRecord]) -> Option<String> {
        let frames = self.resolve(records);
        if frames.is_empty() {
            return None;
        }
        Some(format!("{} leaked at one of:\n{}", message, frames.join("\n")))
    }
}

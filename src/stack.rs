//! Creation-time stack capture for provenance records
//!
//! Each interception wrapper captures the current call stack before
//! delegating to the real operation. Frames are rendered to plain text
//! immediately so records stay self-contained; symbolication cost is paid
//! once at creation, which is acceptable for a diagnostic build.

use backtrace::Backtrace;

/// Maximum frames kept per captured stack (prevent unbounded records)
pub const MAX_STACK_DEPTH: usize = 64;

/// An ordered sequence of textual stack frames, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedStack {
    frames: Vec<String>,
}

impl CapturedStack {
    /// Build a stack from pre-rendered frame lines. The resolver treats
    /// frames as opaque text, so synthetic stacks behave identically to
    /// captured ones.
    pub fn from_frames<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut frames: Vec<String> = frames.into_iter().map(Into::into).collect();
        frames.truncate(MAX_STACK_DEPTH);
        Self { frames }
    }

    /// Frame lines, innermost first.
    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Capture the current call stack as rendered frame lines.
///
/// The capture machinery's own frames are included here; the attribution
/// resolver filters them out by line classification rather than by depth,
/// so this function does not need to guess how many frames to skip.
pub fn capture() -> CapturedStack {
    let bt = Backtrace::new();
    let mut frames = Vec::with_capacity(16);

    for frame in bt.frames() {
        for symbol in frame.symbols() {
            frames.push(render_symbol(
                symbol.name().map(|n| n.to_string()),
                symbol.filename().map(|p| p.display().to_string()),
                symbol.lineno(),
            ));
            if frames.len() >= MAX_STACK_DEPTH {
                return CapturedStack { frames };
            }
        }
    }

    CapturedStack { frames }
}

/// Render one symbol to the `at name (file:line)` frame format.
fn render_symbol(name: Option<String>, file: Option<String>, line: Option<u32>) -> String {
    let name = name.unwrap_or_else(|| "<unknown>".to_string());
    match (file, line) {
        (Some(file), Some(line)) => format!("at {} ({}:{})", name, file, line),
        (Some(file), None) => format!("at {} ({})", name, file),
        _ => format!("at {}", name),
    }
}

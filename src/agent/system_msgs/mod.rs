//! Role system messages, embedded at compile time.

pub fn orchestrator() -> &'static str {
    include_str!("orchestrator.md")
}

pub fn explorer() -> &'static str {
    include_str!("explorer.md")
}

pub fn coder() -> &'static str {
    include_str!("coder.md")
}

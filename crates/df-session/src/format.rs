const BULLET: char = '•';
const DROPPED_MARKERS: [&str; 2] = ["Complete DOT Graph Code", "```"];

/// Turn the prose that preceded a graph into a bulleted list for display.
///
/// Blank lines, code fences and the "Complete DOT Graph Code" heading are
/// dropped. Lines already bulleted are kept, `-` lines are indented as
/// sub-items, and everything else gets a bullet.
#[must_use]
pub fn format_explanation(explanation: &str) -> String {
    explanation
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !DROPPED_MARKERS.iter().any(|marker| line.contains(marker)))
        .map(|line| {
            if line.starts_with(BULLET) {
                line.to_string()
            } else if line.starts_with('-') {
                format!("  {line}")
            } else {
                format!("{BULLET} {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

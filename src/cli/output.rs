//! Output formatting for CLI

use crate::extract::Checkpoint;

/// Format watermarks one per line; unset sources read `(none)`
pub fn format_checkpoint(checkpoint: &Checkpoint) -> String {
    if checkpoint.is_empty() {
        return "No watermarks recorded; the next run is a cold start.\n".to_string();
    }

    let width = checkpoint.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let mut output = String::new();
    for (source, value) in checkpoint.iter() {
        output.push_str(&format!(
            "{source:<width$}  {}\n",
            value.unwrap_or("(none)")
        ));
    }
    output
}

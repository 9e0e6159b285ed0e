use tracing::debug;

use fable_core::tokens::estimate_token_count;
use fable_core::world::LogEntry;
use fable_prompt::{describe_and_append, ImageContextBuilder};

use crate::clean::strip_html;
use crate::{memory_budget, IMAGE_LABEL};

/// Upper bound on entries considered for world memory.
pub const WORLD_MEMORY_MAX_ENTRIES: usize = 50;

/// Default lookback window in rounds.
pub const DEFAULT_WORLD_ROUNDS: u32 = 20;

/// Chronological digest of recent world history, one `[R{round}] ...` line
/// per entry.
///
/// Entries are walked newest first; the first one that would push the total
/// past `token_limit - TOKEN_HEADROOM` ends the walk.
pub fn build_world_memory<'a>(
    history: &'a [LogEntry],
    current_round: u32,
    rounds_to_keep: u32,
    token_limit: usize,
    mut images: Option<&mut ImageContextBuilder<'a>>,
) -> String {
    let budget = memory_budget(token_limit);
    let oldest_round = current_round.saturating_sub(rounds_to_keep);

    let recent: Vec<&LogEntry> = history.iter().filter(|e| e.round >= oldest_round).collect();
    let window = &recent[recent.len().saturating_sub(WORLD_MEMORY_MAX_ENTRIES)..];

    let mut lines = Vec::with_capacity(window.len());
    let mut total = 0;

    for &entry in window.iter().rev() {
        let body = strip_html(&entry.content)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let mut line = format!("[R{}] {body}", entry.round);
        if images.is_some() {
            line = describe_and_append(&line, &entry.images, IMAGE_LABEL);
        }

        let tokens = estimate_token_count(&line);
        if total + tokens > budget {
            debug!(round = entry.round, tokens, total, budget, "world memory budget reached");
            break;
        }
        total += tokens;
        if let Some(builder) = images.as_deref_mut() {
            builder.register_all(&entry.images);
        }
        lines.push(line);
    }

    lines.reverse();
    debug!(entries = lines.len(), tokens = total, "world memory built");
    lines.join("\n")
}
